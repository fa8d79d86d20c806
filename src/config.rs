use std::env;

/// Process-wide settings, read once from the environment at startup and
/// handed out by reference. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub log_level: String,
    /// When set, logs are additionally written to a daily-rolled file in this
    /// directory via a non-blocking appender; stdout logging always stays on.
    pub log_dir: Option<String>,
    pub dry_run: bool,
    pub paper_trade: bool,

    pub webhook_secret: String,

    // Trading parameters
    pub max_daily_trades: u32,
    pub max_daily_loss: f64,
    pub default_quantity: i64,
    pub stop_loss_percent: f64,
    pub trade_cooldown_minutes: i64,
    pub signal_debounce_minutes: i64,
    pub dedup_window_seconds: i64,
    pub min_price_range: f64,
    pub max_consecutive_losses: u32,

    // Entry limit strategy
    pub entry_limit_below_percent: f64,
    pub entry_limit_timeout_minutes: f64,

    // Exit strategy
    pub profit_target_percent: f64,
    pub trailing_stop_percent: f64,
    pub trailing_stop_after_scale_out_percent: f64,
    pub max_hold_minutes: i64,
    pub force_exit_hour: u32,
    pub force_exit_minute: u32,
    pub afternoon_window_enabled: bool,
    pub scale_out_enabled: bool,
    pub breakeven_trigger_percent: f64,
    pub scale_out_tier_1_percent: f64,
    pub scale_out_tier_1_qty: i64,
    pub scale_out_tier_2_percent: f64,
    pub scale_out_tier_2_qty: i64,

    // Option selection
    pub option_delta_target: f64,
    pub option_max_spread_percent: f64,

    // Monitoring intervals
    pub order_poll_interval_seconds: u64,
    pub exit_check_interval_seconds: u64,

    // ORB auto strategy
    pub active_strategy: String,
    pub orb_min_range: f64,
    pub orb_poll_interval_seconds: u64,

    // Supported tickers (admission allowlist)
    pub supported_tickers: Vec<String>,

    // HTTP surface
    pub http_bind_addr: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            app_name: env_or_string("APP_NAME", "DayTrader 0DTE"),
            log_level: env_or_string("LOG_LEVEL", "info"),
            log_dir: env::var("LOG_DIR").ok().filter(|v| !v.is_empty()),
            dry_run: env_or("DRY_RUN", true),
            paper_trade: env_or("PAPER_TRADE", true),

            webhook_secret: env_or_string("WEBHOOK_SECRET", "change-me"),

            max_daily_trades: env_or("MAX_DAILY_TRADES", 10),
            max_daily_loss: env_or("MAX_DAILY_LOSS", 500.0),
            default_quantity: env_or("DEFAULT_QUANTITY", 2),
            stop_loss_percent: env_or("STOP_LOSS_PERCENT", 16.0),
            trade_cooldown_minutes: env_or("TRADE_COOLDOWN_MINUTES", 5),
            signal_debounce_minutes: env_or("SIGNAL_DEBOUNCE_MINUTES", 2),
            dedup_window_seconds: env_or("DEDUP_WINDOW_SECONDS", 30),
            min_price_range: env_or("MIN_PRICE_RANGE", 0.50),
            max_consecutive_losses: env_or("MAX_CONSECUTIVE_LOSSES", 3),

            entry_limit_below_percent: env_or("ENTRY_LIMIT_BELOW_PERCENT", 5.0),
            entry_limit_timeout_minutes: env_or("ENTRY_LIMIT_TIMEOUT_MINUTES", 3.0),

            profit_target_percent: env_or("PROFIT_TARGET_PERCENT", 40.0),
            trailing_stop_percent: env_or("TRAILING_STOP_PERCENT", 20.0),
            trailing_stop_after_scale_out_percent: env_or("TRAILING_STOP_AFTER_SCALE_OUT_PERCENT", 10.0),
            max_hold_minutes: env_or("MAX_HOLD_MINUTES", 90),
            force_exit_hour: env_or("FORCE_EXIT_HOUR", 15),
            force_exit_minute: env_or("FORCE_EXIT_MINUTE", 30),
            afternoon_window_enabled: env_or("AFTERNOON_WINDOW_ENABLED", true),
            scale_out_enabled: env_or("SCALE_OUT_ENABLED", true),
            breakeven_trigger_percent: env_or("BREAKEVEN_TRIGGER_PERCENT", 10.0),
            scale_out_tier_1_percent: env_or("SCALE_OUT_TIER_1_PERCENT", 20.0),
            scale_out_tier_1_qty: env_or("SCALE_OUT_TIER_1_QTY", 10),
            scale_out_tier_2_percent: env_or("SCALE_OUT_TIER_2_PERCENT", 40.0),
            scale_out_tier_2_qty: env_or("SCALE_OUT_TIER_2_QTY", 8),

            option_delta_target: env_or("OPTION_DELTA_TARGET", 0.4),
            option_max_spread_percent: env_or("OPTION_MAX_SPREAD_PERCENT", 10.0),

            order_poll_interval_seconds: env_or("ORDER_POLL_INTERVAL_SECONDS", 5),
            exit_check_interval_seconds: env_or("EXIT_CHECK_INTERVAL_SECONDS", 10),

            active_strategy: env_or_string("ACTIVE_STRATEGY", "orb_auto"),
            orb_min_range: env_or("ORB_MIN_RANGE", 0.30),
            orb_poll_interval_seconds: env_or("ORB_POLL_INTERVAL_SECONDS", 30),

            supported_tickers: env::var("SUPPORTED_TICKERS")
                .map(|v| v.split(',').map(|s| s.trim().to_uppercase()).collect())
                .unwrap_or_else(|_| vec!["SPY".to_string()]),

            http_bind_addr: env_or_string("HTTP_BIND_ADDR", "127.0.0.1:8080"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
