use super::*;

const FAILURE_TEXT: &str = "⚠️ Something went wrong while updating your links. Please try again.";

pub(super) async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let user_id = match msg.from() {
        Some(user) => user.id.0,
        None => return Ok(()),
    };

    if let Some(allowed) = state.config.user_id {
        if user_id != allowed {
            return Ok(());
        }
    }

    let text = match msg.text() {
        Some(text) => text.to_string(),
        None => return Ok(()),
    };
    let chat_id = msg.chat.id;

    if let Some(cmd) = parse_command(&text) {
        match cmd.to_lowercase().as_str() {
            "start" | "help" => {
                bot.send_message(chat_id, HELP_TEXT).await?;
                return Ok(());
            }
            "list" => {
                let reply = state.router.on_list_requested(chat_id.0).await;
                reply_or_report(&bot, chat_id, reply).await?;
                return Ok(());
            }
            "delete" | "del" => {
                let outcome = state
                    .router
                    .on_delete_listing_requested(chat_id.0)
                    .await
                    .map(ChatReply::Deletion);
                reply_or_report(&bot, chat_id, outcome).await?;
                return Ok(());
            }
            _ => {
                // Unknown command, fall through as text.
            }
        }
    }

    match state.router.on_chat_text(chat_id.0, &text).await {
        Ok(ChatReply::FetchRequested(url)) => {
            info!("received link {} in chat {}", url, chat_id.0);
            send_html(
                &bot,
                chat_id,
                &build_reply_text(&ChatReply::FetchRequested(url.clone())),
            )
            .await?;
            let saved = state.router.save_link(&url).await;
            reply_or_report(&bot, chat_id, saved).await?;
        }
        reply => reply_or_report(&bot, chat_id, reply).await?,
    }

    Ok(())
}

/// Sends the rendered reply, or a short apology when the core hit a persistence fault.
async fn reply_or_report(bot: &Bot, chat_id: ChatId, reply: Result<ChatReply>) -> Result<()> {
    match reply {
        Ok(reply) => send_html(bot, chat_id, &build_reply_text(&reply)).await,
        Err(err) => {
            error!("chat {}: {:#}", chat_id.0, err);
            send_error(bot, chat_id, FAILURE_TEXT).await
        }
    }
}
