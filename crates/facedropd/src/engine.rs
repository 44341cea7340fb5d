use facedrop_core::{AnalyzeError, Bitmap, Detection, FaceAnalyzer};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analysis failed: {0}")]
    Analyze(#[from] AnalyzeError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One queued analysis, answered over `reply`.
struct AnalyzeRequest {
    bitmap: Bitmap,
    reply: oneshot::Sender<Result<Vec<Detection>, AnalyzeError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<AnalyzeRequest>,
}

impl EngineHandle {
    /// Queue `bitmap` for analysis and wait for the result.
    pub async fn analyze(&self, bitmap: Bitmap) -> Result<Vec<Detection>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AnalyzeRequest {
                bitmap,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The analyzer's inference sessions need exclusive access, so the thread
/// owns it and serves requests one at a time in arrival order. The thread
/// exits once every [`EngineHandle`] is dropped.
pub fn spawn_engine<A>(mut analyzer: A, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + 'static,
{
    let (tx, mut rx) = mpsc::channel::<AnalyzeRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facedrop-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(AnalyzeRequest { bitmap, reply }) = rx.blocking_recv() {
                if reply.is_closed() {
                    tracing::debug!("caller gone before analysis started; skipping");
                    continue;
                }

                let started = std::time::Instant::now();
                let result = analyzer.analyze(&bitmap);
                tracing::debug!(
                    width = bitmap.width(),
                    height = bitmap.height(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "engine: analysis finished"
                );

                if reply.send(result).is_err() {
                    tracing::warn!("caller dropped before analysis result was delivered");
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facedrop_core::detector::DetectorError;
    use facedrop_core::{Dimensions, Embedding, FaceBox, Rect};
    use image::Rgb;

    /// Reports one face per bright red pixel column in row 0.
    struct RedColumnCounter;

    impl FaceAnalyzer for RedColumnCounter {
        fn analyze(&mut self, bitmap: &Bitmap) -> Result<Vec<Detection>, AnalyzeError> {
            let faces = (0..bitmap.width())
                .filter(|&x| bitmap.get_pixel(x, 0).0 == [255, 0, 0])
                .map(|x| Detection {
                    detection: FaceBox {
                        rect: Rect { x: x as f32, y: 0.0, width: 1.0, height: 1.0 },
                        score: 1.0,
                        image_dims: Dimensions { width: bitmap.width(), height: bitmap.height() },
                    },
                    landmarks: vec![],
                    descriptor: Embedding { values: vec![x as f32] },
                })
                .collect();
            Ok(faces)
        }
    }

    struct Broken;

    impl FaceAnalyzer for Broken {
        fn analyze(&mut self, _: &Bitmap) -> Result<Vec<Detection>, AnalyzeError> {
            Err(DetectorError::InferenceFailed("boom".into()).into())
        }
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let engine = spawn_engine(RedColumnCounter, 4).unwrap();

        let mut bitmap = Bitmap::new(8, 2);
        bitmap.put_pixel(2, 0, Rgb([255, 0, 0]));
        bitmap.put_pixel(5, 0, Rgb([255, 0, 0]));

        let faces = engine.analyze(bitmap).await.unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].descriptor.values, vec![2.0]);
        assert_eq!(faces[1].detection.image_dims, Dimensions { width: 8, height: 2 });
    }

    #[tokio::test]
    async fn test_engine_empty_result_is_ok() {
        let engine = spawn_engine(RedColumnCounter, 1).unwrap();
        let faces = engine.analyze(Bitmap::new(4, 4)).await.unwrap();
        assert!(faces.is_empty());
    }

    #[tokio::test]
    async fn test_engine_propagates_analyzer_error() {
        let engine = spawn_engine(Broken, 1).unwrap();
        let err = engine.analyze(Bitmap::new(1, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Analyze(AnalyzeError::Detector(_))));
    }

    #[tokio::test]
    async fn test_engine_serves_concurrent_callers() {
        let engine = spawn_engine(RedColumnCounter, 2).unwrap();

        let tasks: Vec<_> = (0..8u32)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let mut bitmap = Bitmap::new(8, 1);
                    bitmap.put_pixel(i, 0, Rgb([255, 0, 0]));
                    engine.analyze(bitmap).await
                })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            let faces = task.await.unwrap().unwrap();
            assert_eq!(faces.len(), 1);
            assert_eq!(faces[0].descriptor.values, vec![i as f32]);
        }
    }
}
