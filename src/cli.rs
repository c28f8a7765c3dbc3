//! CLI argument parsing.

use clap::Parser;

/// Relay messages from allow-listed members of one Telegram group to a single chat.
///
/// All settings come from the environment (or a `.env` file in the working
/// directory): ACCOUNT_ID, ACCOUNT_SECRET, ACCOUNT_PHONE, TARGET_GROUP_ID,
/// TARGET_USER_HANDLES, DESTINATION_CHAT_ID and optionally SESSION_PATH.
#[derive(Parser, Debug)]
#[command(name = "tg-group-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {}
