//! Background stream producer
//!
//! A spawned task pulls fragments from the source, folds them through the
//! [`BlockAccumulator`] and hands the resulting events to the consumer over
//! a bounded channel. Exactly one of the final message or an error is
//! delivered once the task is done.

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{PiError, Result};
use crate::messages::AssistantMessage;

use super::{AssistantMessageEvent, BlockAccumulator, FragmentStream};

/// Consumer side of a streamed response
#[derive(Debug)]
pub struct AssistantMessageEventStream {
    /// Lifecycle events, closed when the producer ends
    pub events: mpsc::Receiver<AssistantMessageEvent>,

    /// Final message, sent only on success
    pub result: oneshot::Receiver<AssistantMessage>,

    /// Failure or cancellation, sent only when there is no result
    pub error: oneshot::Receiver<PiError>,
}

impl AssistantMessageEventStream {
    /// Receive the next event
    pub async fn next(&mut self) -> Option<AssistantMessageEvent> {
        self.events.recv().await
    }

    /// Split into the event receiver and the outcome
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Receiver<AssistantMessageEvent>, StreamOutcome) {
        (
            self.events,
            StreamOutcome {
                result: self.result,
                error: self.error,
            },
        )
    }

    /// Ignore the remaining events and wait for the outcome
    ///
    /// # Errors
    ///
    /// Returns the error the producer delivered
    pub async fn outcome(self) -> Result<AssistantMessage> {
        let (events, outcome) = self.into_parts();
        drop(events);
        outcome.wait().await
    }

    /// Drain every event, then wait for the outcome
    pub async fn collect(self) -> (Vec<AssistantMessageEvent>, Result<AssistantMessage>) {
        let (mut events, outcome) = self.into_parts();
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        (collected, outcome.wait().await)
    }
}

/// Result and error channels of a stream
#[derive(Debug)]
pub struct StreamOutcome {
    result: oneshot::Receiver<AssistantMessage>,
    error: oneshot::Receiver<PiError>,
}

impl StreamOutcome {
    /// Wait for whichever of the result or the error arrives
    ///
    /// # Errors
    ///
    /// Returns the delivered error, or [`PiError::Stream`] if the producer
    /// went away without delivering anything
    pub async fn wait(mut self) -> Result<AssistantMessage> {
        tokio::select! {
            biased;
            Ok(message) = &mut self.result => Ok(message),
            Ok(err) = &mut self.error => Err(err),
            else => Err(PiError::Stream("Producer ended without an outcome".to_string())),
        }
    }
}

/// Sends events, giving up as soon as the stream is cancelled
struct EventEmitter {
    tx: mpsc::Sender<AssistantMessageEvent>,
    cancel: CancellationToken,
    receiver_gone: bool,
}

impl EventEmitter {
    async fn emit(&mut self, event: AssistantMessageEvent) -> Result<()> {
        if self.receiver_gone {
            return Ok(());
        }

        let kind = event.kind();
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PiError::Cancelled),
            sent = self.tx.send(event) => {
                if sent.is_err() {
                    tracing::debug!(kind, "Event receiver dropped, no further events");
                    self.receiver_gone = true;
                }
                Ok(())
            }
        }
    }

    async fn emit_all(&mut self, events: Vec<AssistantMessageEvent>) -> Result<()> {
        for event in events {
            self.emit(event).await?;
        }
        Ok(())
    }
}

struct Producer {
    source: FragmentStream,
    blocks: BlockAccumulator,
    emitter: EventEmitter,
    cancel: CancellationToken,
}

impl Producer {
    async fn run(
        mut self,
        result_tx: oneshot::Sender<AssistantMessage>,
        error_tx: oneshot::Sender<PiError>,
    ) {
        let err = match self.pump().await {
            Ok(()) => match self.complete().await {
                Ok(message) => {
                    tracing::debug!(stop_reason = %message.stop_reason, items = message.contents.len(), "Stream completed");
                    if result_tx.send(message).is_err() {
                        tracing::debug!("Result receiver dropped");
                    }
                    return;
                }
                Err(err) => err,
            },
            Err(err) => err,
        };

        self.fail(&err).await;
        if error_tx.send(err).is_err() {
            tracing::debug!("Error receiver dropped");
        }
    }

    /// Pull fragments until the source ends, then close the last block
    async fn pump(&mut self) -> Result<()> {
        self.emitter.emit(AssistantMessageEvent::Start).await?;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PiError::Cancelled),
                next = self.source.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };

            let events = self.blocks.push(&chunk?);
            self.emitter.emit_all(events).await?;
        }

        if self.cancel.is_cancelled() {
            return Err(PiError::Cancelled);
        }

        let events = self.blocks.finish();
        self.emitter.emit_all(events).await
    }

    async fn complete(&mut self) -> Result<AssistantMessage> {
        let message = self.blocks.partial_message();
        self.emitter
            .emit(AssistantMessageEvent::Done {
                reason: message.stop_reason,
                message: message.clone(),
            })
            .await?;
        Ok(message)
    }

    /// Report a failure on the event channel
    ///
    /// Cancellation ends the event sequence silently.
    async fn fail(&mut self, err: &PiError) {
        if err.is_cancelled() {
            tracing::debug!("Stream cancelled");
            return;
        }

        tracing::debug!(error = %err, "Stream failed");
        let mut partial = self.blocks.partial_message();
        partial.stop_reason = err.stop_reason();
        partial.error_message = Some(err.to_string());

        let event = AssistantMessageEvent::Error {
            reason: partial.stop_reason,
            partial,
        };
        if self.emitter.emit(event).await.is_err() {
            tracing::debug!("Cancelled before the error event was delivered");
        }
    }
}

/// Start producing events for `source` on a background task
///
/// `initial` is the empty message the content is accumulated into.
/// `capacity` bounds the event channel (minimum 1).
#[must_use]
pub fn spawn_event_stream(
    source: FragmentStream,
    initial: AssistantMessage,
    cancel: CancellationToken,
    capacity: usize,
) -> AssistantMessageEventStream {
    let (event_tx, events) = mpsc::channel(capacity.max(1));
    let (result_tx, result) = oneshot::channel();
    let (error_tx, error) = oneshot::channel();

    tracing::debug!(provider = %initial.provider, model = %initial.model, capacity, "Starting stream producer");

    let producer = Producer {
        source,
        blocks: BlockAccumulator::new(initial),
        emitter: EventEmitter {
            tx: event_tx,
            cancel: cancel.clone(),
            receiver_gone: false,
        },
        cancel,
    };
    tokio::spawn(producer.run(result_tx, error_tx));

    AssistantMessageEventStream {
        events,
        result,
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::test_support::{finish, text, tool};
    use super::super::OpenAIStreamChunk;
    use super::*;
    use crate::config::ProviderType;
    use crate::messages::{Content, StopReason};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn source(chunks: Vec<Result<OpenAIStreamChunk>>) -> FragmentStream {
        Box::pin(futures::stream::iter(chunks))
    }

    fn spawn(source: FragmentStream, cancel: CancellationToken) -> AssistantMessageEventStream {
        spawn_event_stream(
            source,
            AssistantMessage::new(ProviderType::Nvidia, "openai/gpt-oss-20b"),
            cancel,
            1,
        )
    }

    fn kinds(events: &[AssistantMessageEvent]) -> Vec<&'static str> {
        events.iter().map(AssistantMessageEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_hello_world_stream() {
        let stream = spawn(
            source(vec![Ok(text("Hello, ")), Ok(text("world")), Ok(finish("stop"))]),
            CancellationToken::new(),
        );

        let (events, outcome) = stream.collect().await;
        assert_eq!(
            kinds(&events),
            vec!["start", "text_start", "text_delta", "text_delta", "text_end", "done"]
        );

        let message = outcome.unwrap();
        assert_eq!(message.contents, vec![Content::text("Hello, world")]);
        assert_eq!(message.stop_reason, StopReason::Stop);
        match events.last() {
            Some(AssistantMessageEvent::Done { reason, message: done }) => {
                assert_eq!(*reason, StopReason::Stop);
                assert_eq!(done, &message);
            }
            other => panic!("Expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_call_stream() {
        let stream = spawn(
            source(vec![
                Ok(tool(0, Some("t1"), Some("getWeather"), "{\"location\":")),
                Ok(tool(0, None, None, "\"Tokyo\"}")),
                Ok(finish("tool_calls")),
            ]),
            CancellationToken::new(),
        );

        let (events, outcome) = stream.collect().await;
        assert_eq!(
            kinds(&events),
            vec![
                "start",
                "toolcall_start",
                "toolcall_delta",
                "toolcall_delta",
                "toolcall_end",
                "done"
            ]
        );

        let message = outcome.unwrap();
        assert_eq!(message.stop_reason, StopReason::ToolUse);
        let calls = message.tool_calls();
        assert_eq!(calls[0].id, "t1");
        assert_eq!(json!(calls[0].arguments), json!({"location": "Tokyo"}));
    }

    #[tokio::test]
    async fn test_empty_source_completes() {
        let stream = spawn(source(Vec::new()), CancellationToken::new());
        let (events, outcome) = stream.collect().await;

        assert_eq!(kinds(&events), vec!["start", "done"]);
        let message = outcome.unwrap();
        assert!(message.contents.is_empty());
        assert_eq!(message.stop_reason, StopReason::Unknown);
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream() {
        let cancel = CancellationToken::new();
        let pending = source(vec![Ok(text("Hel"))]).chain(futures::stream::pending());
        let mut stream = spawn(Box::pin(pending), cancel.clone());

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            let is_delta = matches!(event, AssistantMessageEvent::TextDelta { .. });
            seen.push(event);
            if is_delta {
                break;
            }
        }
        assert_eq!(kinds(&seen), vec!["start", "text_start", "text_delta"]);

        cancel.cancel();
        let (rest, outcome) = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .unwrap();

        assert!(rest.is_empty(), "unexpected events after cancel: {rest:?}");
        let err = outcome.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.stop_reason(), StopReason::Aborted);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_event_channel() {
        let cancel = CancellationToken::new();
        let chunks: Vec<Result<OpenAIStreamChunk>> = (0..8).map(|_| Ok(text("tick"))).collect();
        let AssistantMessageEventStream {
            mut events,
            result,
            error,
        } = spawn(source(chunks), cancel.clone());

        // Nobody reads, so the producer parks on the second send
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(2), error)
            .await
            .expect("producer stayed blocked after cancel")
            .unwrap();
        assert!(err.is_cancelled());
        assert!(result.await.is_err());

        let mut buffered = Vec::new();
        while let Some(event) = events.recv().await {
            buffered.push(event);
        }
        assert_eq!(kinds(&buffered), vec!["start"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (events, outcome) = spawn(source(vec![Ok(text("never"))]), cancel).collect().await;
        assert!(events.is_empty());
        assert!(matches!(outcome, Err(PiError::Cancelled)));
    }

    #[tokio::test]
    async fn test_backend_error_emits_error_event() {
        let stream = spawn(
            source(vec![
                Ok(text("partial")),
                Err(PiError::Api {
                    provider: "openai".into(),
                    message: "overloaded".into(),
                }),
                Ok(text("unreachable")),
            ]),
            CancellationToken::new(),
        );

        let (events, outcome) = stream.collect().await;
        assert_eq!(kinds(&events), vec!["start", "text_start", "text_delta", "error"]);

        match events.last() {
            Some(AssistantMessageEvent::Error { reason, partial }) => {
                assert_eq!(*reason, StopReason::Error);
                assert_eq!(partial.stop_reason, StopReason::Error);
                assert!(partial.contents.is_empty());
                assert!(partial.error_message.as_deref().unwrap().contains("overloaded"));
            }
            other => panic!("Expected error event, got {other:?}"),
        }
        assert!(matches!(outcome, Err(PiError::Api { .. })));
    }

    #[tokio::test]
    async fn test_dropped_event_receiver_still_delivers_result() {
        let stream = spawn(
            source(vec![Ok(text("a")), Ok(text("b")), Ok(finish("length"))]),
            CancellationToken::new(),
        );

        let message = stream.outcome().await.unwrap();
        assert_eq!(message.text(), "ab");
        assert_eq!(message.stop_reason, StopReason::Length);
    }

    #[tokio::test]
    async fn test_exactly_one_outcome() {
        let stream = spawn(source(vec![Ok(text("x"))]), CancellationToken::new());
        let AssistantMessageEventStream {
            mut events,
            result,
            error,
        } = stream;
        while events.recv().await.is_some() {}

        assert!(result.await.is_ok());
        assert!(error.await.is_err());
    }

    #[tokio::test]
    async fn test_text_deltas_concatenate_to_text_end() {
        let pieces = ["The ", "quick ", "brown ", "fox"];
        let mut chunks: Vec<Result<OpenAIStreamChunk>> =
            pieces.iter().map(|piece| Ok(text(piece))).collect();
        chunks.push(Ok(finish("stop")));

        let (events, _) = spawn(source(chunks), CancellationToken::new()).collect().await;

        let mut deltas = String::new();
        let mut ended = None;
        for event in &events {
            match event {
                AssistantMessageEvent::TextDelta { delta, .. } => deltas.push_str(delta),
                AssistantMessageEvent::TextEnd { content, .. } => ended = Some(content.clone()),
                _ => {}
            }
        }
        assert_eq!(ended.as_deref(), Some(deltas.as_str()));
    }
}
