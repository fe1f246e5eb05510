use sentinex_core::{
    build_record, Attempt, AttemptError, AttemptEvent, AttendanceGate, AttendanceRecord,
    AttendanceStatus, Clock, FaceVerifier, FenceSnapshot, FenceSource, GeoCoordinate,
    PositionSource, PreparedSelfie, RecordSink, Verification,
};
use sentinex_remote::SelfieError;
use tokio::task::JoinError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no location fix; enable location and try again")]
    NoFix,
    #[error("current location {0} is outside every geofence")]
    OutsideGeofence(GeoCoordinate),
    #[error("selfie error: {0}")]
    Selfie(#[from] SelfieError),
    #[error("selfie preparation task failed: {0}")]
    SelfieTask(String),
    #[error("face verification failed: {0}")]
    Verifier(String),
    #[error("{0}")]
    FaceRejected(String),
    #[error("failed to save attendance: {0}")]
    Sink(String),
    #[error(transparent)]
    Transition(#[from] AttemptError),
    #[error("engine task exited")]
    ChannelClosed,
}

/// One attendance attempt as requested by a client.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    pub badge_id: String,
    pub status: AttendanceStatus,
    pub position: Option<GeoCoordinate>,
    /// Encoded image as sent by the client.
    pub selfie: Vec<u8>,
}

struct EngineRequest {
    attempt: AttemptRequest,
    reply: oneshot::Sender<Result<AttendanceRecord, EngineError>>,
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one attempt to completion and return the stored record.
    pub async fn attempt(&self, attempt: AttemptRequest) -> Result<AttendanceRecord, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest {
                attempt,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// The most recently published fence snapshot.
pub struct LiveFences(pub watch::Receiver<FenceSnapshot>);

impl FenceSource for LiveFences {
    fn snapshot(&self) -> FenceSnapshot {
        self.0.borrow().clone()
    }
}

/// Everything an attempt needs besides its request.
pub struct Engine<V, C, S> {
    pub gate: AttendanceGate,
    pub fences: LiveFences,
    pub verifier: V,
    pub clock: C,
    pub sink: S,
}

/// Spawn the engine on the current runtime.
///
/// Requests are processed one at a time in arrival order.
pub fn spawn_engine<V, C, S>(engine: Engine<V, C, S>) -> EngineHandle
where
    V: FaceVerifier + 'static,
    C: Clock + 'static,
    S: RecordSink + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    tokio::spawn(async move {
        tracing::info!(mode = ?engine.gate.mode(), "engine task started");
        while let Some(req) = rx.recv().await {
            let result = run_attempt(&engine, req.attempt).await;
            let _ = req.reply.send(result);
        }
        tracing::info!("engine task exiting");
    });

    EngineHandle { tx }
}

/// Decode and re-encode the selfie on the blocking pool.
async fn prepare_off_thread(bytes: Vec<u8>) -> Result<PreparedSelfie, EngineError> {
    tokio::task::spawn_blocking(move || sentinex_remote::prepare_selfie(&bytes))
        .await
        .map_err(selfie_task_error)?
        .map_err(EngineError::from)
}

fn selfie_task_error(join: JoinError) -> EngineError {
    tracing::error!(error = %join, "selfie preparation task did not complete");
    EngineError::SelfieTask(join.to_string())
}

/// Authorize, capture, verify, record.
async fn run_attempt<V, C, S>(
    engine: &Engine<V, C, S>,
    request: AttemptRequest,
) -> Result<AttendanceRecord, EngineError>
where
    V: FaceVerifier,
    C: Clock,
    S: RecordSink,
{
    let AttemptRequest {
        badge_id,
        status,
        position,
        selfie,
    } = request;
    let position = position.current_position();
    let mut attempt = Attempt::new(badge_id.as_str(), status);

    attempt.advance(AttemptEvent::Begin)?;
    let snapshot = engine.fences.snapshot();
    let auth = engine.gate.authorize(position.as_ref(), snapshot.fences());

    if !auth.authorized {
        attempt.advance(AttemptEvent::Denied)?;
        tracing::info!(
            badge = %badge_id,
            status = %status,
            snapshot = snapshot.version,
            fences = snapshot.len(),
            has_fix = position.is_some(),
            "attempt rejected by gate"
        );
        attempt.advance(AttemptEvent::Dismissed)?;
        return Err(match position {
            None => EngineError::NoFix,
            Some(p) => EngineError::OutsideGeofence(p),
        });
    }
    attempt.advance(AttemptEvent::Authorized)?;

    let selfie = match prepare_off_thread(selfie).await {
        Ok(selfie) => selfie,
        Err(e) => {
            attempt.advance(AttemptEvent::Failed)?;
            return Err(e);
        }
    };
    attempt.advance(AttemptEvent::SelfieCaptured)?;

    let name = match engine.verifier.verify(&badge_id, &selfie).await {
        Ok(Verification::Identified { name }) => name,
        Ok(Verification::Rejected { reason }) => {
            attempt.advance(AttemptEvent::Failed)?;
            return Err(EngineError::FaceRejected(reason));
        }
        Err(e) => {
            attempt.advance(AttemptEvent::Failed)?;
            tracing::warn!(badge = %badge_id, error = %e, "face verification unavailable");
            return Err(EngineError::Verifier(e.to_string()));
        }
    };
    attempt.advance(AttemptEvent::FaceVerified)?;

    let timestamp = engine.clock.now().await;
    let record = build_record(
        &badge_id,
        status.flag(),
        timestamp,
        position,
        auth.matched_fence.as_ref(),
        Some(&name),
    )
    .with_selfie_digest(selfie.digest);

    if let Err(e) = engine.sink.append(&record).await {
        attempt.advance(AttemptEvent::Failed)?;
        tracing::error!(badge = %badge_id, error = %e, "failed to append attendance record");
        return Err(EngineError::Sink(e.to_string()));
    }
    attempt.advance(AttemptEvent::Recorded)?;

    Ok(record)
}
