use anyhow::{Context as _, Result};
use serde_json::json;

use super::{report, Context};
use crate::cli::args::{EvaluateArgs, JudgeArgs, TestArgs};
use crate::exit_codes::{CLIENT_ERROR, SUCCESS};

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Failures degrade to a zero-count result, still printed.
pub async fn evaluate(ctx: &Context, args: EvaluateArgs) -> Result<i32> {
    let result = ctx
        .evaluation
        .evaluate_judge(&args.judge, &args.trace_ids)
        .await;
    print_json(&result)?;
    Ok(SUCCESS)
}

pub async fn test(ctx: &Context, args: TestArgs) -> Result<i32> {
    match ctx.evaluation.test_judge(&args.judge, &args.trace).await {
        Ok(result) => {
            print_json(&result)?;
            Ok(SUCCESS)
        }
        Err(e) => Ok(report(&e)),
    }
}

pub async fn align(ctx: &Context, args: JudgeArgs) -> Result<i32> {
    let outcome = ctx
        .alignment
        .spawn_alignment(args.judge)
        .await
        .context("alignment task panicked")?;
    match outcome {
        Ok(response) => {
            print_json(&response)?;
            Ok(SUCCESS)
        }
        Err(e) => Ok(report(&e)),
    }
}

pub async fn compare(ctx: &Context, args: JudgeArgs) -> Result<i32> {
    match ctx.metrics.compare_versions(&args.judge).await {
        Ok(comparison) => {
            print_json(&json!({
                "metrics": comparison.metrics,
                "previous_agreement_rate": comparison.metrics.previous_agreement_rate(),
                "new_agreement_rate": comparison.metrics.new_agreement_rate(),
                "comparisons": comparison.comparisons,
            }))?;
            Ok(SUCCESS)
        }
        Err(e) => Ok(report(&e)),
    }
}

pub async fn delete(ctx: &Context, args: JudgeArgs) -> Result<i32> {
    match ctx.evaluation.delete_judge(&args.judge).await {
        Ok(deleted) => {
            print_json(&json!({ "judge_id": args.judge, "deleted": deleted }))?;
            Ok(if deleted { SUCCESS } else { CLIENT_ERROR })
        }
        Err(e) => Ok(report(&e)),
    }
}
