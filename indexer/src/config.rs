//! Runtime configuration, loaded from environment variables with hardcoded
//! defaults — the same layering the teacher's `config.rs` uses, minus the
//! optional JSON file override (there is no per-deployment tuning file here,
//! just the env vars spec §6 names).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    /// Blocks a coinbase output must mature for before it unlocks (spec §6).
    pub block_reward_lock: u32,
    /// `maxGap` used by wallet materialization (spec §4.4).
    pub default_gap_limit: u32,
    /// Default page size for history queries; requests may ask for less but
    /// never more than `history_page_size_max`.
    pub default_history_page_size: u32,
    pub history_page_size_max: u32,
}

impl Config {
    pub fn load() -> Self {
        let mut config = Config {
            database_url: "postgres://localhost/wallet_index".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            block_reward_lock: 300,
            default_gap_limit: 20,
            default_history_page_size: 50,
            history_page_size_max: 200,
        };

        if let Ok(v) = std::env::var("DATABASE_URL") {
            config.database_url = v;
        }
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = v;
        }
        if let Ok(v) = std::env::var("BLOCK_REWARD_LOCK") {
            if let Ok(parsed) = v.parse() {
                config.block_reward_lock = parsed;
            }
        }
        if let Ok(v) = std::env::var("DEFAULT_GAP_LIMIT") {
            if let Ok(parsed) = v.parse() {
                config.default_gap_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("DEFAULT_HISTORY_PAGE_SIZE") {
            if let Ok(parsed) = v.parse() {
                config.default_history_page_size = parsed;
            }
        }

        config.sanity_check();
        config
    }

    fn sanity_check(&self) {
        if self.default_gap_limit == 0 {
            panic!("DEFAULT_GAP_LIMIT must be positive");
        }
        if self.default_history_page_size == 0 || self.default_history_page_size > self.history_page_size_max {
            panic!("DEFAULT_HISTORY_PAGE_SIZE must be in (0, history_page_size_max]");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config {
            database_url: String::new(),
            listen_addr: String::new(),
            block_reward_lock: 100,
            default_gap_limit: 20,
            default_history_page_size: 50,
            history_page_size_max: 200,
        };
        config.sanity_check();
    }

    #[test]
    #[should_panic]
    fn zero_gap_limit_panics() {
        let config = Config {
            database_url: String::new(),
            listen_addr: String::new(),
            block_reward_lock: 100,
            default_gap_limit: 0,
            default_history_page_size: 50,
            history_page_size_max: 200,
        };
        config.sanity_check();
    }
}
