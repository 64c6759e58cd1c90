pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    tokio_util::sync::CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_cancellation_token() {
        let token = create_pipeline_cancellation_token();
        assert!(!token.is_cancelled());

        let child = token.clone();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
