pub const UPDATE_STAGED: &str =
    "The latest build of Geyser has been downloaded! A restart must occur in order for changes to take effect.";

pub const UPDATE_FAILED: &str =
    "An error occurred while downloading the latest build of Geyser. Please check the server console for further information!";

pub const RESTART_PENDING: &str =
    "A new Geyser build has been downloaded! Please restart the server in order to use the updated build!";

pub const ALREADY_LATEST: &str = "There is no new Geyser build available.";

pub const RESTART_WARNING_LOG: &str = "The server will be restarting in 10 seconds!";

const SECTION_SIGN: char = '§';

/// Wrap `message` in a chat colour, `'a'` for green and `'c'` for red.
#[must_use]
pub fn colored(code: char, message: &str) -> String {
    format!("{SECTION_SIGN}{code}{message}")
}

/// Translate `&`-prefixed colour and format codes into the `§` codes game
/// clients render. An `&` not followed by a known code is left alone.
#[must_use]
pub fn translate_color_codes(message: &str) -> String {
    let mut translated = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '&'
            && let Some(&next) = chars.peek()
            && is_color_code(next)
        {
            translated.push(SECTION_SIGN);
            translated.push(next.to_ascii_lowercase());
            chars.next();
        } else {
            translated.push(ch);
        }
    }

    translated
}

fn is_color_code(ch: char) -> bool {
    matches!(ch.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

#[cfg(test)]
mod tests {
    use super::{colored, translate_color_codes};

    #[test]
    fn ampersand_codes_become_section_codes() {
        assert_eq!(
            translate_color_codes("&2Restarting &lsoon&R!"),
            "§2Restarting §lsoon§r!"
        );
    }

    #[test]
    fn unknown_codes_and_trailing_ampersand_are_kept() {
        assert_eq!(translate_color_codes("Tom & Jerry &z &"), "Tom & Jerry &z &");
    }

    #[test]
    fn colored_prefixes_section_code() {
        assert_eq!(colored('a', "done"), "§adone");
    }
}
