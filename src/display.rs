use chrono::{DateTime, Duration, Utc};

use gigconnect::messaging::Session;
use gigconnect::models::{Conversation, HistoryEntry, Role};

// Text rendering for the line-oriented chat client

const PREVIEW_WIDTH: usize = 40;

/// Up to two uppercase initials of a display name, "??" when there is no name.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect();
    if letters.is_empty() {
        "??".to_string()
    } else {
        letters
    }
}

/// "Just now", "5m ago", "3h ago", "2d ago", "1w ago", "2mo ago", then a date.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - at;
    if elapsed < Duration::minutes(1) {
        "Just now".to_string()
    } else if elapsed < Duration::hours(1) {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed < Duration::days(1) {
        format!("{}h ago", elapsed.num_hours())
    } else if elapsed < Duration::weeks(1) {
        format!("{}d ago", elapsed.num_days())
    } else if elapsed < Duration::days(30) {
        format!("{}w ago", elapsed.num_weeks())
    } else if elapsed < Duration::days(365) {
        format!("{}mo ago", elapsed.num_days() / 30)
    } else {
        at.format("%b %-d, %Y").to_string()
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn role_badge(role: Role) -> String {
    format!("[{}]", role)
}

pub fn conversation_line(index: usize, conversation: &Conversation, online: bool, active: bool, now: DateTime<Utc>) -> String {
    let other = &conversation.other_user;
    let marker = if active { '>' } else { ' ' };
    let presence = if online { " ● Online" } else { "" };
    let (preview, when) = match &conversation.last_message {
        Some(message) => (
            truncate(&message.content, PREVIEW_WIDTH),
            relative_time(message.created_at, now),
        ),
        None => ("No messages yet".to_string(), String::new()),
    };

    format!(
        "{}{:>2}. ({}) {} {}{}  {}  {}",
        marker,
        index + 1,
        initials(&other.name),
        other.name,
        role_badge(other.role),
        presence,
        preview,
        when
    )
    .trim_end()
    .to_string()
}

pub fn conversation_list(session: &Session, now: DateTime<Utc>) -> Vec<String> {
    let conversations = session.conversations();
    if conversations.is_empty() {
        return vec![
            "No conversations yet".to_string(),
            "Start messaging freelancers or clients to see conversations here.".to_string(),
        ];
    }

    let active = session.active_conversation_id();
    conversations
        .iter()
        .enumerate()
        .map(|(index, conversation)| {
            conversation_line(
                index,
                conversation,
                session.is_online(&conversation.other_user.id),
                active == Some(&conversation.id),
                now,
            )
        })
        .collect()
}

pub fn history_view(session: &Session, now: DateTime<Utc>) -> Vec<String> {
    let conversation = match session.active_conversation() {
        Some(conversation) => conversation,
        None => return vec!["Select a conversation to start chatting (/open <n>)".to_string()],
    };
    let other = &conversation.other_user;
    let me = session.user();

    let status = if session.is_online(&other.id) { "Online" } else { "Offline" };
    let mut lines = vec![format!(
        "== {} ({}) {} {} ==",
        other.name,
        initials(&other.name),
        role_badge(other.role),
        status
    )];

    if session.is_loading_history() && session.history().is_empty() {
        lines.push("Loading messages...".to_string());
    } else if session.history().is_empty() {
        lines.push("Start the conversation!".to_string());
        lines.push(format!("Send your first message to {}", other.name));
    }

    for entry in session.history().entries() {
        let message = entry.message();
        let author = if message.sender_id == me.id {
            initials(&me.name)
        } else {
            initials(&other.name)
        };
        let state = match entry {
            HistoryEntry::Pending { .. } => " (sending…)".to_string(),
            HistoryEntry::Confirmed(_) => String::new(),
        };
        lines.push(format!(
            "[{}] {}: {}{}",
            relative_time(message.created_at, now),
            author,
            message.content,
            state
        ));
    }

    if session.is_typing() {
        lines.push(format!("{} is typing...", other.name));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gigconnect::models::{ConversationId, Message, MessageId, UserId, UserRef};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("Shankar Yerra"), "SY");
        assert_eq!(initials("siva kumar reddy"), "SK");
        assert_eq!(initials("Cher"), "C");
        assert_eq!(initials("   "), "??");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = now();
        assert_eq!(relative_time(now - Duration::seconds(30), now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(8), now), "1w ago");
        assert_eq!(relative_time(now - Duration::days(65), now), "2mo ago");
        assert_eq!(relative_time(now - Duration::days(400), now), "Aug 16, 2024");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long message here", 6), "a long...");
    }

    #[test]
    fn test_conversation_line() {
        let conversation = Conversation {
            id: ConversationId::from("1"),
            other_user: UserRef {
                id: UserId::from("2"),
                name: "Shankar Yerra".to_string(),
                role: Role::Freelancer,
                avatar: None,
            },
            last_message: Some(Message {
                id: Some(MessageId::from("3")),
                conversation_id: ConversationId::from("1"),
                sender_id: UserId::from("2"),
                content: "When can we schedule a call?".to_string(),
                created_at: now() - Duration::minutes(5),
            }),
            created_at: now(),
        };

        let line = conversation_line(0, &conversation, true, false, now());
        assert!(line.contains("1. (SY) Shankar Yerra [freelancer] ● Online"));
        assert!(line.ends_with("When can we schedule a call?  5m ago"));

        let mut empty = conversation.clone();
        empty.last_message = None;
        let line = conversation_line(1, &empty, false, true, now());
        assert!(line.starts_with("> 2."));
        assert!(line.ends_with("No messages yet"));
    }
}
