//! Line commands typed at the prompt.
//!
//! Lines starting with `:` control the tab host; anything else is sent to
//! the active session as a shell command. `::` escapes a leading colon.

use terminal::KeyInput;

pub const HELP: &str = "\
:list              list sessions
:switch N          make tab N active
:next / :prev      cycle tabs
:all CMD           run CMD on every connected session
:key NAME          send a key (enter, tab, up, ctrl-c, ...)
:resize COLS ROWS  resize the active session
:screen            print the active session's screen
:reconnect         reconnect the active session
:close             close the active session
:quit              disconnect everything and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain shell input for the active session.
    Send(String),
    List,
    /// One-based tab number.
    Switch(usize),
    Next,
    Prev,
    Broadcast(String),
    Key(KeyInput),
    Resize { cols: u16, rows: u16 },
    Screen,
    Reconnect,
    Close,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(escaped) = line.strip_prefix("::") {
        return Ok(Command::Send(format!(":{escaped}")));
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "list" | "ls" => Command::List,
        "switch" | "s" => {
            let n = args
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("usage: :switch N (got '{args}')"))?;
            Command::Switch(n)
        }
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "all" => {
            if args.is_empty() {
                return Err("usage: :all CMD".into());
            }
            Command::Broadcast(args.to_string())
        }
        "key" => Command::Key(parse_key(args)?),
        "resize" => {
            let mut parts = args.split_whitespace().map(str::parse::<u16>);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(cols)), Some(Ok(rows)), None) if cols > 0 && rows > 0 => {
                    Command::Resize { cols, rows }
                }
                _ => return Err("usage: :resize COLS ROWS".into()),
            }
        }
        "screen" => Command::Screen,
        "reconnect" => Command::Reconnect,
        "close" => Command::Close,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(format!("unknown command ':{other}', try :help")),
    };
    Ok(command)
}

fn parse_key(name: &str) -> Result<KeyInput, String> {
    let lower = name.to_ascii_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => KeyInput::Enter,
        "backspace" | "bs" => KeyInput::Backspace,
        "tab" => KeyInput::Tab,
        "up" => KeyInput::Up,
        "down" => KeyInput::Down,
        "left" => KeyInput::Left,
        "right" => KeyInput::Right,
        _ => {
            let ctrl = lower.strip_prefix("ctrl-").or_else(|| lower.strip_prefix("c-"));
            let mut chars = ctrl.unwrap_or(&lower).chars();
            match (ctrl.is_some(), chars.next(), chars.next()) {
                (true, Some(c), None) if c.is_ascii_alphabetic() => KeyInput::Ctrl(c),
                (false, Some(c), None) => KeyInput::Char(c),
                _ => return Err(format!("unknown key '{name}'")),
            }
        }
    };
    Ok(key)
}
