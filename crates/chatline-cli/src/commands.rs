/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    Select(String),
    Title(String),
    Delete(Option<String>),
    Model(Option<String>),
    Models,
    History,
    Regenerate,
    Cancel,
    Attach(String),
    Errors,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  <text>            send a message in the active conversation
  /new              start a new conversation
  /list             list conversations (newest first)
  /select <n|id>    switch to a conversation by list number or id prefix
  /title <text>     rename the active conversation
  /delete [n|id]    delete a conversation (default: the active one)
  /model [id]       show or change the model
  /models           list available models by provider
  /history          print the active conversation
  /regen            regenerate the last answer
  /cancel           cancel the pending answer
  /attach <path>    attach an image to the next message
  /errors           show recent warnings and errors
  /help             show this help
  /quit             exit";

impl Command {
    /// Parse a line. Returns `Err` with a usage hint for malformed commands.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        let command = match (name, arg) {
            ("new", _) => Self::New,
            ("list" | "ls", _) => Self::List,
            ("select", Some(target)) => Self::Select(target),
            ("select", None) => return Err("usage: /select <n|id>".into()),
            ("title", Some(title)) => Self::Title(title),
            ("title", None) => return Err("usage: /title <text>".into()),
            ("delete" | "rm", target) => Self::Delete(target),
            ("model", id) => Self::Model(id),
            ("models", _) => Self::Models,
            ("history", _) => Self::History,
            ("regen" | "regenerate", _) => Self::Regenerate,
            ("cancel" | "stop", _) => Self::Cancel,
            ("attach", Some(path)) => Self::Attach(path),
            ("attach", None) => return Err("usage: /attach <path>".into()),
            ("errors", _) => Self::Errors,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            (other, _) => return Err(format!("unknown command /{other}, try /help")),
        };
        Ok(Some(command))
    }
}

/// Guess an image MIME type from the file extension
pub fn image_mime_type(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
