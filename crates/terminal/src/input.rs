//! Keyboard input encoding.
//!
//! Maps key events to the byte sequences an xterm-compatible remote shell
//! expects on its input stream.

/// A key event delivered to the focused session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Enter,
    Backspace,
    Tab,
    Up,
    Down,
    Right,
    Left,
    /// Ctrl combined with a letter.
    Ctrl(char),
    /// A typed character.
    Char(char),
}

/// Encode a key event. Returns `None` for keys that must not reach the shell.
pub fn encode_key(key: KeyInput) -> Option<Vec<u8>> {
    let bytes = match key {
        KeyInput::Enter => vec![b'\r'],
        KeyInput::Backspace => vec![0x7f],
        KeyInput::Tab => vec![b'\t'],
        KeyInput::Up => b"\x1b[A".to_vec(),
        KeyInput::Down => b"\x1b[B".to_vec(),
        KeyInput::Right => b"\x1b[C".to_vec(),
        KeyInput::Left => b"\x1b[D".to_vec(),
        KeyInput::Ctrl(c) if c.is_ascii_alphabetic() => {
            vec![c.to_ascii_uppercase() as u8 - b'@']
        }
        KeyInput::Ctrl(_) => return None,
        // Raw control characters arrive as their named keys above.
        KeyInput::Char(c) if (c as u32) < 0x20 => return None,
        KeyInput::Char(c) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
    };
    Some(bytes)
}
