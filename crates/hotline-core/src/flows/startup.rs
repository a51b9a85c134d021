//! First-run bootstrap and startup checks.

use crate::{
    domain::{ChatId, UserId},
    flows::FlowContext,
    models::HotlineConfig,
    Result,
};

/// Ensure the singleton documents exist and the admins know what is left
/// to configure. Runs once, before the dispatcher accepts updates.
///
/// On the very first run the seed admin becomes the sole admin and
/// superadmin; afterwards the environment values are ignored and the
/// config document is the only authority.
pub async fn bootstrap(
    ctx: &FlowContext,
    default_admin: UserId,
    ga_seed: Option<ChatId>,
) -> Result<()> {
    let config = match ctx.store.load_config().await? {
        Some(config) => config,
        None => {
            let config = HotlineConfig::bootstrap(default_admin, ga_seed);
            ctx.store.seed_config(&config).await?;
            ctx.oplog.record("First run: config document created").await;

            let greeting = "Hello! You are the superadmin of this support hotline bot. \
                 Use /start here to configure it.";
            if let Err(err) = ctx
                .messenger
                .send_html(default_admin.private_chat(), greeting)
                .await
            {
                ctx.oplog
                    .record(&format!(
                        "Could not message the admin ({err}). Tell the admin to start the bot!"
                    ))
                    .await;
            }
            config
        }
    };

    ctx.store.seed_statistics().await?;

    if config.staff_chat_id.is_none() {
        nag_admins(
            ctx,
            &config,
            "The staff chat is not set, the bot cannot serve users yet. Use /start to set it.",
        )
        .await;
    }
    if config.assessment_form_link.is_none() {
        nag_admins(
            ctx,
            &config,
            "The assessment form link is not set, the bot cannot serve users yet. Use /start to set it.",
        )
        .await;
    }

    if let Err(err) = ctx.messenger.install_user_commands().await {
        ctx.oplog
            .record(&format!("Failed to register the command menu: {err}"))
            .await;
    }

    Ok(())
}

async fn nag_admins(ctx: &FlowContext, config: &HotlineConfig, text: &str) {
    for admin in &config.admins_list {
        if let Err(err) = ctx.messenger.send_html(admin.private_chat(), text).await {
            ctx.oplog
                .record(&format!("Could not nag admin {}: {err}", admin.0))
                .await;
        }
    }
}
