//! Channel-backed interaction collector
//!
//! Requests are pushed onto an unbounded queue; whoever drains it (a UI,
//! a REPL, a test) answers each one through its one-shot reply.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::core::error::{PipelineError, Result};
use crate::interaction::{InputRequest, InputValue, InteractionCollector};

/// A request waiting for the player
#[derive(Debug)]
pub struct PendingInput {
    pub request: InputRequest,
    reply: oneshot::Sender<Option<InputValue>>,
}

impl PendingInput {
    /// Supply a value. Returns false if the pipeline stopped waiting.
    pub fn answer(self, value: InputValue) -> bool {
        self.reply.send(Some(value)).is_ok()
    }

    /// Close the picker without choosing anything
    pub fn dismiss(self) -> bool {
        self.reply.send(None).is_ok()
    }
}

pub struct ChannelCollector {
    requests: mpsc::UnboundedSender<PendingInput>,
}

impl ChannelCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { requests: tx }, rx)
    }
}

#[async_trait]
impl InteractionCollector for ChannelCollector {
    async fn request_input(&self, request: InputRequest) -> Result<Option<InputValue>> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(PendingInput { request, reply })
            .map_err(|_| PipelineError::InvalidState("interaction channel closed".into()))?;

        // A dropped reply means the picker went away: same as cancelling it
        Ok(answer.await.unwrap_or(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CheckId, InstanceId};
    use crate::interaction::InputKind;

    fn request() -> InputRequest {
        InputRequest {
            instance_id: InstanceId::new(),
            check_id: CheckId::from("claim-hexes"),
            step_id: "hexes".into(),
            kind: InputKind::SelectHexes { count: 1 },
            prompt: "Pick a hex".into(),
        }
    }

    #[tokio::test]
    async fn test_answer_reaches_requester() {
        let (collector, mut rx) = ChannelCollector::new();
        let answering = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.step_id, "hexes");
            pending.answer(InputValue::Hexes(vec!["3.4".into()]));
        });

        let value = collector.request_input(request()).await.unwrap();
        answering.await.unwrap();
        assert_eq!(value, Some(InputValue::Hexes(vec!["3.4".into()])));
    }

    #[tokio::test]
    async fn test_dropped_request_counts_as_cancel() {
        let (collector, mut rx) = ChannelCollector::new();
        tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            drop(pending);
        });

        assert_eq!(collector.request_input(request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (collector, rx) = ChannelCollector::new();
        drop(rx);
        assert!(collector.request_input(request()).await.is_err());
    }
}
