use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Format a pubkey for display (shortened)
pub fn format_pubkey(pubkey: &Pubkey) -> String {
    short_address(&pubkey.to_string())
}

/// Shorten any base58 address to `abcd...wxyz`
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Human readable uptime, e.g. `2d 03h 15m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m {:02}s", minutes, secs % 60)
    }
}

/// Format a SOL amount with a fixed number of decimals
pub fn format_sol(sol: f64) -> String {
    format!("{:.4} SOL", sol)
}
