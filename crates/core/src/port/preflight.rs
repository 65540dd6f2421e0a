// Pre-flight validator port (spec §4.4)
//
// The only place the controller is allowed to probe external resources
// before writing any state. Validators must be cheap and side-effect-free;
// they typically check existence/readability of a blob or reachability of
// a target container.

use async_trait::async_trait;

#[async_trait]
pub trait PreflightValidator: Send + Sync {
    /// Human-readable name, surfaced in `PreflightError` messages.
    fn name(&self) -> &str;

    /// `Ok(())` to pass, `Err(reason)` to short-circuit the submission.
    async fn validate(&self, parameters: &serde_json::Value) -> Result<(), String>;
}

pub mod mocks {
    use super::*;

    pub struct AlwaysPass;

    #[async_trait]
    impl PreflightValidator for AlwaysPass {
        fn name(&self) -> &str {
            "always_pass"
        }

        async fn validate(&self, _parameters: &serde_json::Value) -> Result<(), String> {
            Ok(())
        }
    }

    pub struct AlwaysFail(pub String);

    #[async_trait]
    impl PreflightValidator for AlwaysFail {
        fn name(&self) -> &str {
            "always_fail"
        }

        async fn validate(&self, _parameters: &serde_json::Value) -> Result<(), String> {
            Err(self.0.clone())
        }
    }
}
