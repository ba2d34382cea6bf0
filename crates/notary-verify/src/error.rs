/// Errors that prevent a verification answer. Format and mismatch problems
/// are answers (`INVALID_FORMAT`, `NOT_FOUND`), not errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("registry lookup failed: {0}")]
    Lookup(#[from] notary_anchor::AnchorError),
}
