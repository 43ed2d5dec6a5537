/// Normalises a transcription: trimmed, lower-cased, `None` when empty.
pub fn normalize(text: &str) -> Option<String> {
    let text = text.trim().to_lowercase();
    (!text.is_empty()).then_some(text)
}

/// True when `command` contains any stop phrase. Both sides are compared
/// lower-cased.
pub fn is_stop_command(command: &str, stop_phrases: &[String]) -> bool {
    let command = command.to_lowercase();
    stop_phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .any(|p| !p.is_empty() && command.contains(&p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        vec!["stop program".into(), "exit program".into()]
    }

    #[test]
    fn stop_phrase_matches_anywhere_in_the_command() {
        assert!(is_stop_command("ok please stop program now", &phrases()));
        assert!(is_stop_command("Exit Program", &phrases()));
        assert!(!is_stop_command("stop the hog rider", &phrases()));
        assert!(!is_stop_command("anything", &["  ".to_string()]));
    }

    #[test]
    fn normalize_drops_blank_input() {
        assert_eq!(normalize("  Play Giant Left \n").as_deref(), Some("play giant left"));
        assert_eq!(normalize(" \t "), None);
    }
}
