pub mod retry;

use std::fmt::Display;

pub trait LogErr<T, E> {
    /// Log the error (if any) at `error` level and pass the result through.
    fn log_err(self, context: &str) -> Result<T, E>;
}

impl<T, E: Display> LogErr<T, E> for Result<T, E> {
    fn log_err(self, context: &str) -> Result<T, E> {
        self.inspect_err(|e| tracing::error!(error = %e, "{context}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_err_passes_result_through() {
        let ok: Result<u8, String> = Ok(1);
        assert_eq!(ok.log_err("unused"), Ok(1));
        let err: Result<u8, String> = Err("boom".into());
        assert_eq!(err.log_err("failed"), Err("boom".to_owned()));
    }
}
