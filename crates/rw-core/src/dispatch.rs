use std::sync::Arc;

use crate::{
    differ::Violation,
    domain::{ChatId, UserId},
    messaging::port::MessagingGateway,
};

/// Delivery counts for one `report` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchResult {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Sends one notice per violation to the chat's recipient.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn MessagingGateway>,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { gateway }
    }

    /// Each send is independent; a failed one is logged and the rest still go
    /// out. Nothing is retried here, the next audit tick covers that.
    pub async fn report(
        &self,
        admin_id: UserId,
        chat_id: ChatId,
        violations: &[Violation],
    ) -> DispatchResult {
        let mut res = DispatchResult::default();
        for v in violations {
            res.attempted += 1;
            let text = violation_notice(chat_id, v);
            match self.gateway.send_message(admin_id, &text).await {
                Ok(_) => res.delivered += 1,
                Err(e) => {
                    res.failed += 1;
                    tracing::warn!(
                        chat_id = chat_id.0,
                        admin_id = admin_id.0,
                        user_id = v.identity.user_id.0,
                        "failed to deliver violation notice: {e}"
                    );
                }
            }
        }
        if res.attempted > 0 {
            tracing::info!(
                chat_id = chat_id.0,
                admin_id = admin_id.0,
                delivered = res.delivered,
                failed = res.failed,
                "violation report sent"
            );
        }
        res
    }
}

pub fn violation_notice(chat_id: ChatId, v: &Violation) -> String {
    format!(
        "User {} is not on the allow-list (chat {chat_id}).",
        v.identity.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::Identity, testing::FakeGateway};

    fn violation(id: i64, username: &str) -> Violation {
        Violation {
            identity: Identity::new(id, username.to_uppercase(), Some(username)),
        }
    }

    #[tokio::test]
    async fn partial_failure_does_not_abort_remaining_sends() {
        let gw = Arc::new(FakeGateway::default());
        gw.fail_sends_containing("@bob");
        let dispatcher = NotificationDispatcher::new(gw.clone());

        let res = dispatcher
            .report(
                UserId(42),
                ChatId(-100),
                &[violation(1, "alice"), violation(2, "bob"), violation(3, "carol")],
            )
            .await;

        assert_eq!(
            res,
            DispatchResult {
                attempted: 3,
                delivered: 2,
                failed: 1
            }
        );
        let sent = gw.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(to, _)| *to == UserId(42)));
        assert!(sent[0].1.contains("@alice"));
        assert!(sent[1].1.contains("@carol"));
    }

    #[tokio::test]
    async fn empty_report_sends_nothing() {
        let gw = Arc::new(FakeGateway::default());
        let res = NotificationDispatcher::new(gw.clone())
            .report(UserId(1), ChatId(-1), &[])
            .await;
        assert_eq!(res, DispatchResult::default());
        assert!(gw.sent().is_empty());
    }

    #[test]
    fn notice_names_user_and_chat() {
        let text = violation_notice(ChatId(-100), &violation(2, "carol"));
        assert_eq!(text, "User CAROL (@carol) is not on the allow-list (chat -100).");
    }
}
