//! Telegram update handlers.
//!
//! Each handler is a thin adapter that:
//! - extracts ids and identities from the update
//! - calls into the `rw-core` Monitor
//! - renders the result as a reply (commands only)

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatMemberUpdated},
};

use rw_core::domain::{ChatId, Identity};

use crate::router::AppState;
use crate::{identity_of, is_present};

mod commands;

/// Membership fact carried by a group message.
#[derive(Debug, PartialEq, Eq)]
enum MembershipEvent {
    Joined(Vec<Identity>),
    Left(Identity),
    /// Anyone who posts, commands included, is a member.
    Posted(Identity),
}

fn membership_event(msg: &Message) -> Option<MembershipEvent> {
    if msg.chat.is_private() {
        return None;
    }
    // Service messages: "X joined" / "X left".
    if let Some(users) = msg.new_chat_members() {
        let joined: Vec<Identity> = users
            .iter()
            .filter(|u| !u.is_bot)
            .map(identity_of)
            .collect();
        return (!joined.is_empty()).then_some(MembershipEvent::Joined(joined));
    }
    if let Some(user) = msg.left_chat_member() {
        return (!user.is_bot).then(|| MembershipEvent::Left(identity_of(user)));
    }
    msg.from()
        .filter(|u| !u.is_bot)
        .map(|u| MembershipEvent::Posted(identity_of(u)))
}

#[derive(Debug, PartialEq, Eq)]
enum Transition {
    Joined,
    Left,
}

fn transition(old: &ChatMemberKind, new: &ChatMemberKind) -> Option<Transition> {
    match (is_present(old), is_present(new)) {
        (false, true) => Some(Transition::Joined),
        (true, false) => Some(Transition::Left),
        _ => None,
    }
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(event) = membership_event(&msg) {
        let chat_id = ChatId(msg.chat.id.0);
        // Store failures are logged inside the monitor.
        match event {
            MembershipEvent::Joined(users) => {
                for user in &users {
                    let _ = state.monitor.on_join(user, chat_id).await;
                }
            }
            MembershipEvent::Left(user) => {
                let _ = state.monitor.on_leave(user.user_id, chat_id).await;
            }
            MembershipEvent::Posted(user) => {
                if let Err(e) = state.monitor.observe_sender(&user, chat_id).await {
                    tracing::warn!(chat_id = chat_id.0, "recording message author failed: {e}");
                }
            }
        }
    }

    if msg.text().is_some_and(|t| t.starts_with('/')) {
        return commands::handle_command(bot, msg, state).await;
    }
    Ok(())
}

/// `chat_member` updates: record joins and leaves.
pub async fn handle_chat_member(
    update: ChatMemberUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = ChatId(update.chat.id.0);
    let user = &update.new_chat_member.user;
    if user.is_bot {
        return Ok(());
    }

    match transition(&update.old_chat_member.kind, &update.new_chat_member.kind) {
        Some(Transition::Joined) => {
            let _ = state.monitor.on_join(&identity_of(user), chat_id).await;
        }
        Some(Transition::Left) => {
            let _ = state
                .monitor
                .on_leave(identity_of(user).user_id, chat_id)
                .await;
        }
        None => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rw_core::domain::UserId;
    use teloxide::types::ChatMember;

    const GROUP: &str = r#"{"id":-100,"type":"supergroup","title":"Team"}"#;
    const EVE: &str = r#"{"id":5,"is_bot":false,"first_name":"Eve","username":"eve"}"#;
    const OTHER_BOT: &str = r#"{"id":8,"is_bot":true,"first_name":"Helper"}"#;

    fn message(chat: &str, rest: &str) -> Message {
        let json = format!(r#"{{"message_id":1,"date":1700000000,"chat":{chat},{rest}}}"#);
        serde_json::from_str(&json).unwrap()
    }

    fn kind(status: &str) -> ChatMemberKind {
        let json = format!(r#"{{"user":{EVE},{status}}}"#);
        serde_json::from_str::<ChatMember>(&json).unwrap().kind
    }

    fn restricted(is_member: bool) -> ChatMemberKind {
        kind(&format!(
            r#""status":"restricted","is_member":{is_member},"until_date":0,
            "can_send_messages":false,"can_send_media_messages":false,
            "can_send_audios":false,"can_send_documents":false,"can_send_photos":false,
            "can_send_videos":false,"can_send_video_notes":false,
            "can_send_voice_notes":false,"can_send_polls":false,
            "can_send_other_messages":false,"can_add_web_page_previews":false,
            "can_change_info":false,"can_invite_users":false,"can_pin_messages":false,
            "can_manage_topics":false"#
        ))
    }

    fn eve() -> Identity {
        Identity::new(5, "Eve", Some("eve"))
    }

    #[test]
    fn command_senders_are_recorded_as_members() {
        let msg = message(GROUP, &format!(r#""from":{EVE},"text":"/check@roster_bot""#));
        assert_eq!(membership_event(&msg), Some(MembershipEvent::Posted(eve())));

        let msg = message(GROUP, &format!(r#""from":{EVE},"text":"hello""#));
        assert_eq!(membership_event(&msg), Some(MembershipEvent::Posted(eve())));
    }

    #[test]
    fn private_chats_and_bots_are_not_recorded() {
        let private = r#"{"id":5,"type":"private","first_name":"Eve"}"#;
        let msg = message(private, &format!(r#""from":{EVE},"text":"/start""#));
        assert_eq!(membership_event(&msg), None);

        let msg = message(GROUP, &format!(r#""from":{OTHER_BOT},"text":"beep""#));
        assert_eq!(membership_event(&msg), None);
    }

    #[test]
    fn service_messages_record_joins_and_leaves() {
        let msg = message(
            GROUP,
            &format!(r#""from":{EVE},"new_chat_members":[{EVE},{OTHER_BOT}]"#),
        );
        assert_eq!(membership_event(&msg), Some(MembershipEvent::Joined(vec![eve()])));

        let msg = message(GROUP, &format!(r#""from":{EVE},"left_chat_member":{EVE}"#));
        let Some(MembershipEvent::Left(who)) = membership_event(&msg) else {
            panic!("expected a leave");
        };
        assert_eq!(who.user_id, UserId(5));

        let msg = message(GROUP, &format!(r#""from":{EVE},"new_chat_members":[{OTHER_BOT}]"#));
        assert_eq!(membership_event(&msg), None);
    }

    #[test]
    fn chat_member_transitions() {
        let member = ChatMemberKind::Member;
        let left = ChatMemberKind::Left;
        let banned = kind(r#""status":"kicked","until_date":0"#);
        let muted_member = restricted(true);
        let muted_outsider = restricted(false);

        let cases = [
            (&left, &member, Some(Transition::Joined)),
            (&member, &left, Some(Transition::Left)),
            (&member, &banned, Some(Transition::Left)),
            (&member, &member, None),
            (&left, &banned, None),
            (&member, &muted_member, None),
            (&left, &muted_member, Some(Transition::Joined)),
            (&muted_member, &muted_outsider, Some(Transition::Left)),
            (&left, &muted_outsider, None),
        ];
        for (old, new, want) in cases {
            assert_eq!(transition(old, new), want, "{old:?} -> {new:?}");
        }
    }

    #[test]
    fn restricted_presence_follows_is_member() {
        assert!(is_present(&restricted(true)));
        assert!(!is_present(&restricted(false)));
    }
}
