pub mod time;

pub use time::{history_start_date, iss_date, today};
