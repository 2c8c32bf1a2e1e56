use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;

use rw_core::{
    authz::DenyReason,
    domain::{ChatId, UserId},
    monitor::{CheckReply, StartReply, StatusReport, StopReply},
};

use crate::identity_of;
use crate::router::AppState;

#[derive(Clone, Debug, PartialEq, Eq)]
struct ParsedCommand {
    name: String,
    /// `bot` in `/cmd@bot`.
    mention: Option<String>,
    args: Vec<String>,
}

fn parse_command(text: &str) -> ParsedCommand {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.split_whitespace();
    let first = parts.next().unwrap_or("");
    let args = parts.map(str::to_string).collect();

    let mut head = first.trim_start_matches('/').splitn(2, '@');
    let name = head.next().unwrap_or("").to_lowercase();
    let mention = head.next().filter(|m| !m.is_empty()).map(str::to_string);

    ParsedCommand {
        name,
        mention,
        args,
    }
}

/// Group commands must name the bot (`/cmd@bot` or `/cmd @bot`) so other bots
/// in the same group are left alone.
fn addressed_to(cmd: &ParsedCommand, bot_username: &str) -> bool {
    let is_me = |s: &str| s.eq_ignore_ascii_case(bot_username);
    if let Some(m) = &cmd.mention {
        return is_me(m);
    }
    cmd.args
        .first()
        .and_then(|a| a.strip_prefix('@'))
        .is_some_and(is_me)
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let cmd = parse_command(text);
    let requester = UserId(user.id.0 as i64);
    let requester_label = identity_of(user).label();
    let bot_username = state.bot_username.as_str();

    let reply = if msg.chat.is_private() {
        match cmd.name.as_str() {
            "start" | "help" => Some(private_help(bot_username)),
            "status" => Some(render_status(&state.monitor.status(requester).await)),
            "check" | "stop" => Some(format!(
                "Send this command in the group you want to manage: /{} @{bot_username}",
                cmd.name
            )),
            _ => None,
        }
    } else {
        if !addressed_to(&cmd, bot_username) {
            tracing::debug!(command = %cmd.name, "ignoring group command not addressed to us");
            return Ok(());
        }
        let chat_id = ChatId(msg.chat.id.0);
        tracing::info!(
            chat_id = chat_id.0,
            user_id = requester.0,
            command = %cmd.name,
            "group command"
        );
        match cmd.name.as_str() {
            "start" => {
                let res = state.monitor.start(chat_id, requester).await;
                Some(render_start(
                    &res,
                    requester,
                    &requester_label,
                    state.check_interval,
                    bot_username,
                ))
            }
            "check" => Some(render_check(&state.monitor.check(chat_id, requester).await)),
            "stop" => Some(render_stop(state.monitor.stop(chat_id, requester).await)),
            "help" => Some(group_help(bot_username)),
            _ => None,
        }
    };

    if let Some(text) = reply {
        if let Err(e) = bot
            .send_message(msg.chat.id, text)
            .reply_to_message_id(msg.id)
            .await
        {
            tracing::warn!(chat_id = msg.chat.id.0, "failed to send command reply: {e}");
        }
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

fn private_help(bot_username: &str) -> String {
    format!(
        "Add me to a group, make me an administrator, and send there:\n\
         /start @{bot_username}\n\n\
         Reports are sent privately to the administrator who started the audit.\n\n\
         Group commands:\n\
         /start @{bot_username} - start periodic audits\n\
         /check @{bot_username} - audit now\n\
         /stop @{bot_username} - stop audits\n\n\
         Here: /status - your audited chats"
    )
}

fn group_help(bot_username: &str) -> String {
    format!(
        "/start @{bot_username} - start periodic audits\n\
         /check @{bot_username} - audit now\n\
         /stop @{bot_username} - stop audits"
    )
}

fn render_start(
    reply: &StartReply,
    requester: UserId,
    requester_label: &str,
    interval: Duration,
    bot_username: &str,
) -> String {
    match reply {
        StartReply::Started => format!(
            "Audit started: members will be checked every {}.\n\n\
             Reports will be sent to {requester_label}. Open a private chat with \
             @{bot_username} and press Start, otherwise reports cannot be delivered.",
            format_duration(interval)
        ),
        StartReply::AlreadyActive { recipient } if *recipient == requester => {
            "An audit is already running for this chat.".to_string()
        }
        StartReply::AlreadyActive { .. } => {
            "An audit is already running for this chat; reports go to another administrator."
                .to_string()
        }
        StartReply::Denied(DenyReason::BotNotAdmin) => format!(
            "I need administrator rights to see the chat's members.\n\
             Grant them and send /start @{bot_username} again."
        ),
        StartReply::Denied(DenyReason::RequesterNotAdmin) => {
            "Only a chat administrator can start the audit.".to_string()
        }
        StartReply::ShuttingDown => "The bot is shutting down; try again shortly.".to_string(),
    }
}

fn render_check(reply: &CheckReply) -> String {
    match reply {
        CheckReply::Completed(r) if r.violations == 0 => format!(
            "Check complete: all {} recorded members are on the allow-list.",
            r.members
        ),
        CheckReply::Completed(r) => {
            let mut out = format!(
                "Check complete: {} of {} recorded members are not on the allow-list. \
                 {} report(s) sent",
                r.violations, r.members, r.dispatch.delivered
            );
            if r.dispatch.failed > 0 {
                out.push_str(&format!(", {} could not be delivered", r.dispatch.failed));
            }
            out.push('.');
            out
        }
        CheckReply::NotRecipient => {
            "Only the administrator who started the audit in this chat can run /check."
                .to_string()
        }
        CheckReply::Denied(DenyReason::BotNotAdmin) => {
            "I no longer have administrator rights in this chat.".to_string()
        }
        CheckReply::Denied(DenyReason::RequesterNotAdmin) => {
            "You are no longer an administrator of this chat.".to_string()
        }
        CheckReply::Failed(_) => {
            "The check could not complete; it will be retried on the next scheduled run."
                .to_string()
        }
    }
}

fn render_stop(reply: StopReply) -> String {
    match reply {
        StopReply::Stopped => "Audit stopped for this chat.".to_string(),
        StopReply::NotRecipient => {
            "Only the administrator who started the audit in this chat can stop it.".to_string()
        }
    }
}

fn render_status(status: &StatusReport) -> String {
    let mut lines = Vec::new();
    if status.subscriptions.is_empty() {
        lines.push("You are not receiving reports for any chat.".to_string());
    } else {
        lines.push(format!("Audited chats ({}):", status.subscriptions.len()));
        for s in &status.subscriptions {
            lines.push(format!(
                "- chat {} since {}",
                s.chat_id,
                s.since.format("%Y-%m-%d %H:%M UTC")
            ));
        }
    }

    let refreshed = status
        .allowlist_refreshed_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    lines.push(format!(
        "Allow-list: {} usernames (refreshed {refreshed})",
        status.allowlist_size
    ));
    lines.join("\n")
}
