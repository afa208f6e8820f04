//! Shell command line splitting.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Space,
    Normal,
    Single,
    Double,
    /// Backslash seen; holds the state to return to.
    Escape(Quote),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Double,
}

/// Split a command line into words.
///
/// Whitespace separates words. Single quotes keep their content verbatim,
/// double quotes allow backslash escapes, and a backslash outside quotes
/// escapes the next character. Returns `None` for an unterminated quote or
/// a trailing backslash.
pub fn split_command_line(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut buffer = String::new();
    let mut state = State::Space;

    for ch in line.chars() {
        state = match (state, ch) {
            (State::Space, c) if c.is_whitespace() => State::Space,
            (State::Normal, c) if c.is_whitespace() => {
                words.push(std::mem::take(&mut buffer));
                State::Space
            }
            (State::Space | State::Normal, '\'') => State::Single,
            (State::Space | State::Normal, '"') => State::Double,
            (State::Space | State::Normal, '\\') => State::Escape(Quote::None),
            (State::Space | State::Normal, c) => {
                buffer.push(c);
                State::Normal
            }
            (State::Single, '\'') => State::Normal,
            (State::Double, '"') => State::Normal,
            (State::Double, '\\') => State::Escape(Quote::Double),
            (State::Single | State::Double, c) => {
                buffer.push(c);
                state
            }
            (State::Escape(quote), c) => {
                buffer.push(c);
                match quote {
                    Quote::None => State::Normal,
                    Quote::Double => State::Double,
                }
            }
        };
    }

    match state {
        State::Space => Some(words),
        State::Normal => {
            words.push(buffer);
            Some(words)
        }
        State::Single | State::Double | State::Escape(_) => None,
    }
}
