pub mod follow_button;
pub mod post_stats;
