use tokio::sync::mpsc;

use crate::types::{BatchSize, EngineEvent, FinishReason, GenerationChunk, Usage};

/// Group raw token events into chunks sized by the batch policy.
///
/// The policy's `update()` runs exactly once per emitted chunk boundary, so
/// chunk sizes follow the configured growth curve. Terminal events flush
/// whatever is buffered: `Done` carries its finish reason on the final
/// chunk, an upstream error is forwarded after the partial flush, and a
/// channel that closes without `Done` (an aborted generation) flushes with
/// an abort reason.
pub fn chunk_stream(
    request_id: String,
    mut events: mpsc::Receiver<EngineEvent>,
    mut batch: BatchSize,
) -> mpsc::Receiver<crate::Result<GenerationChunk>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut buffered: Vec<String> = Vec::new();
        let mut emitted_tokens = 0usize;

        let chunk = |tokens: Vec<String>, finish: Option<FinishReason>, total: usize| {
            GenerationChunk {
                request_id: request_id.clone(),
                tokens,
                finish_reason: finish,
                usage: Usage {
                    output_tokens: total,
                },
            }
        };

        loop {
            match events.recv().await {
                Some(EngineEvent::Token(text)) => {
                    buffered.push(text);
                    if buffered.len() >= batch.chunk_capacity() {
                        emitted_tokens += buffered.len();
                        let full = chunk(std::mem::take(&mut buffered), None, emitted_tokens);
                        if tx.send(Ok(full)).await.is_err() {
                            return;
                        }
                        batch.update();
                    }
                }
                Some(EngineEvent::Done(reason)) => {
                    emitted_tokens += buffered.len();
                    let last = chunk(std::mem::take(&mut buffered), Some(reason), emitted_tokens);
                    let _ = tx.send(Ok(last)).await;
                    return;
                }
                Some(EngineEvent::Error(message)) => {
                    if !buffered.is_empty() {
                        emitted_tokens += buffered.len();
                        let partial = chunk(std::mem::take(&mut buffered), None, emitted_tokens);
                        if tx.send(Ok(partial)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Err(crate::Error::engine(message))).await;
                    return;
                }
                None => {
                    if !buffered.is_empty() {
                        emitted_tokens += buffered.len();
                        let partial = chunk(
                            std::mem::take(&mut buffered),
                            Some(FinishReason::Abort),
                            emitted_tokens,
                        );
                        let _ = tx.send(Ok(partial)).await;
                    }
                    return;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::chunk_stream;
    use crate::types::{BatchSize, EngineEvent, FinishReason};
    use tokio::sync::mpsc;

    async fn collect(
        mut rx: mpsc::Receiver<crate::Result<crate::types::GenerationChunk>>,
    ) -> Vec<crate::Result<crate::types::GenerationChunk>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn dynamic_policy_grows_chunk_sizes() {
        let (tx, rx) = mpsc::channel(32);
        let batch = BatchSize::new(4, 1, 2.0).expect("valid config");
        let chunks = chunk_stream("req".to_string(), rx, batch);

        for i in 0..8 {
            tx.send(EngineEvent::Token(format!("t{i}"))).await.unwrap();
        }
        tx.send(EngineEvent::Done(FinishReason::Stop)).await.unwrap();
        drop(tx);

        let chunks = collect(chunks).await;
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|c| c.as_ref().expect("no errors").tokens.len())
            .collect();
        // Capacity walks 1, 2, 4 then clamps; the Done event flushes the rest.
        assert_eq!(sizes, vec![1, 2, 4, 1]);

        let last = chunks.last().unwrap().as_ref().unwrap();
        assert_eq!(last.finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.usage.output_tokens, 8);
    }

    #[tokio::test]
    async fn static_policy_keeps_chunk_size_constant() {
        let (tx, rx) = mpsc::channel(32);
        let batch = BatchSize::new(2, 2, 3.0).expect("valid config");
        let chunks = chunk_stream("req".to_string(), rx, batch);

        for i in 0..5 {
            tx.send(EngineEvent::Token(format!("t{i}"))).await.unwrap();
        }
        tx.send(EngineEvent::Done(FinishReason::Length)).await.unwrap();
        drop(tx);

        let sizes: Vec<usize> = collect(chunks)
            .await
            .iter()
            .map(|c| c.as_ref().expect("no errors").tokens.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn empty_generation_still_emits_final_chunk() {
        let (tx, rx) = mpsc::channel(4);
        let batch = BatchSize::new(4, 1, 2.0).expect("valid config");
        let chunks = chunk_stream("req".to_string(), rx, batch);

        tx.send(EngineEvent::Done(FinishReason::Stop)).await.unwrap();
        drop(tx);

        let chunks = collect(chunks).await;
        assert_eq!(chunks.len(), 1);
        let only = chunks[0].as_ref().unwrap();
        assert!(only.tokens.is_empty());
        assert_eq!(only.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn upstream_error_flushes_then_fails() {
        let (tx, rx) = mpsc::channel(8);
        let batch = BatchSize::new(8, 8, 1.0).expect("valid config");
        let chunks = chunk_stream("req".to_string(), rx, batch);

        tx.send(EngineEvent::Token("partial".to_string())).await.unwrap();
        tx.send(EngineEvent::Error("cuda out of memory".to_string()))
            .await
            .unwrap();
        drop(tx);

        let chunks = collect(chunks).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().tokens, vec!["partial"]);
        let err = chunks[1].as_ref().expect_err("engine error must surface");
        assert!(err.to_string().contains("cuda out of memory"));
    }

    #[tokio::test]
    async fn closed_channel_flushes_with_abort_reason() {
        let (tx, rx) = mpsc::channel(8);
        let batch = BatchSize::new(8, 8, 1.0).expect("valid config");
        let chunks = chunk_stream("req".to_string(), rx, batch);

        tx.send(EngineEvent::Token("halfway".to_string())).await.unwrap();
        drop(tx);

        let chunks = collect(chunks).await;
        assert_eq!(chunks.len(), 1);
        let only = chunks[0].as_ref().unwrap();
        assert_eq!(only.finish_reason, Some(crate::types::FinishReason::Abort));
    }
}
