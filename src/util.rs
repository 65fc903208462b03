use std::path::PathBuf;

const DB_PATH: &str = "INFRA_WATCH_DB_PATH";

pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(DB_PATH).ok().map(PathBuf::from)
}

const SWEEP_PERIOD: &str = "INFRA_WATCH_SWEEP_PERIOD";

pub fn get_sweep_period() -> Option<u64> {
    std::env::var(SWEEP_PERIOD).ok().and_then(|res| res.parse().ok())
}

const EVALUATION_PERIOD: &str = "INFRA_WATCH_EVALUATION_PERIOD";

pub fn get_evaluation_period() -> Option<u64> {
    std::env::var(EVALUATION_PERIOD)
        .ok()
        .and_then(|res| res.parse().ok())
}
