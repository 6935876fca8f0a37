// SPDX-License-Identifier: MIT

//! Terminal approval prompt

use async_trait::async_trait;
use dialoguer::Confirm;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;

use super::{ApprovalChannel, ApprovalDecision, ApprovalRequest};
use crate::adk::error::FlowError;
use crate::flowkit::workflow::context::value_to_text;

const CHANNEL: &str = "console_approval";

/// Asks for a yes/no on the controlling terminal
///
/// With a timeout, an unanswered prompt fails once it elapses and the
/// approval node treats that as a pass-through. The blocking read cannot be
/// interrupted, so the prompt stays on the terminal and the process waits
/// for that line before it exits. Without a timeout the run waits for the
/// answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleApproval;

impl ConsoleApproval {
    fn prompt(request: &ApprovalRequest) -> String {
        let value = value_to_text(&request.value);
        if value.is_empty() {
            format!("{} Approve?", request.message)
        } else {
            format!("{}\n\n{}\n\nApprove?", request.message, value)
        }
    }
}

#[async_trait]
impl ApprovalChannel for ConsoleApproval {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, FlowError> {
        let prompt = Self::prompt(request);
        let task = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        });
        await_answer(task, request.timeout).await
    }
}

async fn await_answer<F, E>(
    answer: F,
    timeout: Option<Duration>,
) -> Result<ApprovalDecision, FlowError>
where
    F: Future<Output = Result<Result<bool, E>, JoinError>>,
    E: Display,
{
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, answer).await.map_err(|_| {
            FlowError::tool(CHANNEL, format!("no answer within {}s", limit.as_secs()))
        })?,
        None => answer.await,
    };

    match joined {
        Err(join) => Err(FlowError::tool(CHANNEL, join.to_string())),
        Ok(Err(e)) => Err(FlowError::tool(CHANNEL, e.to_string())),
        Ok(Ok(true)) => Ok(ApprovalDecision::Approved),
        Ok(Ok(false)) => Ok(ApprovalDecision::Rejected { reason: None }),
    }
}
