use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use debug_types::LogEntry;

pub(super) const SECTION_START: &str = "===== BEGIN {section} =====";
pub(super) const SECTION_END: &str = "===== END {section} =====";

pub(super) fn section_start_marker(section: &str) -> String {
    SECTION_START.replace("{section}", section)
}

pub(super) fn section_end_marker(section: &str) -> String {
    SECTION_END.replace("{section}", section)
}

/// Render one log entry as the header/metadata block the log file stores,
/// matching the teacher-adjacent original's `[role • timestamp • LEVEL]
/// [SECTION] #tags` header format.
pub(super) fn format_entry(entry: &LogEntry) -> String {
    let mut header = format!("[{} • {} • {}]", entry.role, entry.timestamp, entry.level.as_str());

    if let Some(section) = entry.section {
        header.push_str(&format!(" [{}]", section.as_str()));
    }

    if !entry.tags.is_empty() {
        let tags: Vec<String> = entry.tags.iter().map(|tag| format!("#{tag}")).collect();
        header.push(' ');
        header.push_str(&tags.join(" "));
    }

    let metadata_str = if entry.metadata.is_empty() {
        String::new()
    } else {
        let metadata_json =
            serde_json::to_string_pretty(&entry.metadata).unwrap_or_else(|_| format!("{:?}", entry.metadata));
        let indented: String = metadata_json
            .lines()
            .map(|line| format!("    {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n  METADATA:\n{indented}")
    };

    let lines: Vec<&str> = entry.message.split('\n').collect();
    if lines.len() == 1 {
        format!("{header} {}{metadata_str}", entry.message)
    } else {
        let indented_message = lines.join("\n  ");
        format!("{header}\n  {indented_message}{metadata_str}")
    }
}

/// XOR the content with a repeating key, then base64-encode. This is
/// obfuscation, not encryption — documented as such, never claimed as a
/// security boundary.
pub(super) fn encrypt_content(content: &str, key: &str) -> String {
    let key_bytes = key.as_bytes();
    if key_bytes.is_empty() {
        return content.to_string();
    }
    let encrypted: Vec<u8> = content
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key_bytes[i % key_bytes.len()])
        .collect();
    BASE64.encode(encrypted)
}

/// Inverse of [`encrypt_content`]. Returns `None` if the input isn't
/// valid base64 or doesn't decode to valid UTF-8 — the caller logs a
/// placeholder rather than propagating a decode failure.
pub(super) fn decrypt_content(encrypted: &str, key: &str) -> Option<String> {
    let key_bytes = key.as_bytes();
    if key_bytes.is_empty() {
        return Some(encrypted.to_string());
    }
    let encrypted_bytes = BASE64.decode(encrypted.trim_end()).ok()?;
    let decrypted: Vec<u8> = encrypted_bytes
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key_bytes[i % key_bytes.len()])
        .collect();
    String::from_utf8(decrypted).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use debug_types::{LogLevel, Section};

    #[test]
    fn formats_single_line_entry_with_header() {
        let entry = LogEntry::new("2026-07-27T00:00:00Z", "Orchestrator", "hello world");
        let formatted = format_entry(&entry);
        assert_eq!(formatted, "[Orchestrator • 2026-07-27T00:00:00Z • INFO] hello world");
    }

    #[test]
    fn formats_multi_line_message_indented() {
        let entry = LogEntry::new("ts", "role", "line one\nline two");
        let formatted = format_entry(&entry);
        assert!(formatted.contains("\n  line one\n  line two"));
    }

    #[test]
    fn includes_section_marker_when_present() {
        let mut entry = LogEntry::new("ts", "role", "msg");
        entry.section = Some(Section::Reasoning);
        entry.level = LogLevel::Warning;
        let formatted = format_entry(&entry);
        assert!(formatted.contains("[REASONING]"));
        assert!(formatted.contains("WARNING"));
    }

    #[test]
    fn xor_base64_round_trips() {
        let plaintext = "some reasoning text with \n a newline";
        let encrypted = encrypt_content(plaintext, "secret-key");
        assert_ne!(encrypted, plaintext);
        let decrypted = decrypt_content(&encrypted, "secret-key").unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_does_not_panic() {
        let encrypted = encrypt_content("hello", "key-a");
        let decrypted = decrypt_content(&encrypted, "key-b");
        assert!(decrypted.is_none() || decrypted.unwrap() != "hello");
    }
}
