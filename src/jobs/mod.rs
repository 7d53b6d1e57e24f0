pub mod poll_resume;
pub mod webhook_sweep;
