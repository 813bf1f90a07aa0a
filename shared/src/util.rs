use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to the precision PostgreSQL stores (microseconds)
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
