use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use rw_core::{
    config::Config, messaging::port::MessagingGateway, monitor::Monitor, ports::DirectoryStore,
};

use crate::handlers;
use crate::TelegramGateway;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    /// Without the leading `@`.
    pub bot_username: String,
    pub check_interval: Duration,
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn DirectoryStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    let bot_username = me.username().to_string();
    tracing::info!(
        "rosterwatch started as @{bot_username}, audit interval {}s",
        cfg.check_interval.as_secs()
    );

    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    let monitor = Monitor::new(gateway, store, cfg.check_interval);

    let state = Arc::new(AppState {
        monitor: monitor.clone(),
        bot_username,
        check_interval: cfg.check_interval,
    });

    // Polling asks only for the update kinds these branches filter on
    // (messages and chat_member transitions).
    let handler = dptree::entry()
        .branch(Update::filter_chat_member().endpoint(handlers::handle_chat_member))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    monitor.shutdown().await;
    Ok(())
}
