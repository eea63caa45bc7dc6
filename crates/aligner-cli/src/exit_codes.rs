//! Exit codes of the `aligner` binary. Part of its public contract.
//!
//! Core failures are mapped by error kind; the mapping agrees with
//! [`aligner_core::AlignError::exit_code`].

pub const SUCCESS: i32 = 0;
pub const CLIENT_ERROR: i32 = 1; // Not found, invalid input, insufficient labels
pub const CONFIG_ERROR: i32 = 2; // Unreadable state or config file
pub const OPTIMIZATION_FAILED: i32 = 3; // No version created
pub const BACKEND_ERROR: i32 = 4; // Registry, trace store or evaluator failure

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::report;
    use aligner_core::AlignError;

    #[test]
    fn test_codes_match_core_classification() {
        assert_eq!(AlignError::not_found("judge", "j").exit_code(), CLIENT_ERROR);
        assert_eq!(
            AlignError::InsufficientData {
                required: 10,
                actual: 1
            }
            .exit_code(),
            CLIENT_ERROR
        );
        assert_eq!(
            AlignError::Config {
                message: "bad".into()
            }
            .exit_code(),
            CONFIG_ERROR
        );
        assert_eq!(
            AlignError::OptimizationFailed {
                judge_id: "j".into(),
                message: "boom".into()
            }
            .exit_code(),
            OPTIMIZATION_FAILED
        );
        assert_eq!(AlignError::backend("down").exit_code(), BACKEND_ERROR);
    }

    #[test]
    fn test_report_uses_named_codes() {
        let errors = [
            AlignError::invalid_input("empty"),
            AlignError::Config {
                message: "bad".into(),
            },
            AlignError::OptimizationFailed {
                judge_id: "j".into(),
                message: "boom".into(),
            },
            AlignError::backend("down"),
        ];
        let codes: Vec<i32> = errors.iter().map(report).collect();
        assert_eq!(
            codes,
            vec![CLIENT_ERROR, CONFIG_ERROR, OPTIMIZATION_FAILED, BACKEND_ERROR]
        );
        for err in &errors {
            assert_eq!(report(err), err.exit_code());
        }
    }
}
