//! Line-oriented client protocol.
//!
//! Requests: `COMMAND [ARG1] [ARG2] ...\n`, space-tokenized.
//! Responses: `OK [message] [data]\n` or `ERROR <message>\n`.

/// Client command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Set,
    Get,
    Del,
    Exists,
    Ping,
    Quit,
    Unknown,
}

impl Command {
    /// Parse a command token (case-insensitive)
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "SET" => Command::Set,
            "GET" => Command::Get,
            "DEL" | "DELETE" => Command::Del,
            "EXISTS" => Command::Exists,
            "PING" => Command::Ping,
            "QUIT" | "EXIT" => Command::Quit,
            _ => Command::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Set => "SET",
            Command::Get => "GET",
            Command::Del => "DEL",
            Command::Exists => "EXISTS",
            Command::Ping => "PING",
            Command::Quit => "QUIT",
            Command::Unknown => "UNKNOWN",
        }
    }
}

/// Parsed client request
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub args: Vec<String>,
}

impl Request {
    /// Parse a raw request line
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();

        let command = match tokens.next() {
            Some(token) => Command::parse(token),
            None => {
                return Self {
                    command: Command::Unknown,
                    args: Vec::new(),
                };
            }
        };

        Self {
            command,
            args: tokens.map(|t| t.to_string()).collect(),
        }
    }
}

/// Client response
#[derive(Debug, Clone)]
pub struct Response {
    pub success: bool,
    pub message: String,
    pub data: String,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
            data: String::new(),
        }
    }

    pub fn ok_with(message: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: data.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: String::new(),
        }
    }

    /// Render the wire form, newline-terminated
    pub fn format(&self) -> String {
        let mut out = String::from(if self.success { "OK" } else { "ERROR" });

        if !self.message.is_empty() {
            out.push(' ');
            out.push_str(&self.message);
        }
        if !self.data.is_empty() {
            out.push(' ');
            out.push_str(&self.data);
        }

        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_request() {
        let req = Request::parse("SET user:1 alice\n");
        assert_eq!(req.command, Command::Set);
        assert_eq!(req.args, vec!["user:1", "alice"]);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Request::parse("get k").command, Command::Get);
        assert_eq!(Request::parse("delete k").command, Command::Del);
        assert_eq!(Request::parse("exit").command, Command::Quit);
    }

    #[test]
    fn test_unknown_and_empty_commands() {
        assert_eq!(Request::parse("FROB x").command, Command::Unknown);
        assert_eq!(Request::parse("   ").command, Command::Unknown);
    }

    #[test]
    fn test_response_formatting() {
        assert_eq!(Response::ok().format(), "OK\n");
        assert_eq!(Response::ok_with("PONG", "").format(), "OK PONG\n");
        assert_eq!(Response::ok_with("", "alice").format(), "OK alice\n");
        assert_eq!(
            Response::error("Key not found").format(),
            "ERROR Key not found\n"
        );
    }
}
