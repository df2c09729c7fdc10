//! The presentation side of a session.
//!
//! [`PresentationSink`] is what a board UI implements. The session never
//! calls it directly: updates travel as [`DuelEvent`]s over the event channel
//! returned by `DuelClient::start`, and a single consumer applies them with
//! [`dispatch`], [`drain_events`] or [`try_drain_events`]. The UI decides which
//! thread that consumer runs on.

use tokio::sync::mpsc;

use crate::event::DuelEvent;
use crate::protocol::PlayerSign;

/// Write-only surface that renders session state.
pub trait PresentationSink: Send + 'static {
    /// Append a line to the status log.
    fn append_status_line(&mut self, text: &str);

    /// Draw `sign` in `cell_id`.
    fn set_cell(&mut self, cell_id: &str, sign: PlayerSign);

    /// Allow or forbid clicking board cells.
    fn set_board_input_enabled(&mut self, enabled: bool);

    /// Show the game result.
    fn announce_outcome(&mut self, won: bool);

    /// Show or hide the board.
    fn set_board_visible(&mut self, _visible: bool) {}

    /// Show that the session ended because the connection failed.
    fn announce_connection_failure(&mut self, reason: &str) {
        self.append_status_line(reason);
    }

    /// Show that a frame could not be sent.
    fn report_send_failure(&mut self, reason: &str) {
        self.append_status_line(&format!("Failed to send to the server: {reason}"));
    }
}

/// Apply one event to `sink`.
pub fn dispatch<S: PresentationSink + ?Sized>(event: DuelEvent, sink: &mut S) {
    match event {
        DuelEvent::StatusLine(text) => sink.append_status_line(&text),
        DuelEvent::CellUpdated { cell, sign } => sink.set_cell(&cell, sign),
        DuelEvent::BoardInputEnabled(enabled) => sink.set_board_input_enabled(enabled),
        DuelEvent::BoardVisible(visible) => sink.set_board_visible(visible),
        DuelEvent::Outcome { won } => sink.announce_outcome(won),
        DuelEvent::SendFailed { reason } => sink.report_send_failure(&reason),
        DuelEvent::ConnectionFailed { reason } => sink.announce_connection_failure(&reason),
    }
}

/// Apply events in order until the session's event channel closes.
///
/// Returns the number of events applied.
pub async fn drain_events<S: PresentationSink + ?Sized>(
    events: &mut mpsc::Receiver<DuelEvent>,
    sink: &mut S,
) -> usize {
    let mut applied = 0;
    while let Some(event) = events.recv().await {
        dispatch(event, sink);
        applied += 1;
    }
    tracing::debug!(applied, "event channel closed");
    applied
}

/// Apply every event that is already queued without waiting.
///
/// Intended for frame-driven UIs that poll once per frame on their own
/// thread. Returns the number of events applied.
pub fn try_drain_events<S: PresentationSink + ?Sized>(
    events: &mut mpsc::Receiver<DuelEvent>,
    sink: &mut S,
) -> usize {
    let mut applied = 0;
    while let Ok(event) = events.try_recv() {
        dispatch(event, sink);
        applied += 1;
    }
    applied
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    impl PresentationSink for Log {
        fn append_status_line(&mut self, text: &str) {
            self.0.push(format!("status:{text}"));
        }
        fn set_cell(&mut self, cell_id: &str, sign: PlayerSign) {
            self.0.push(format!("cell:{cell_id}={sign}"));
        }
        fn set_board_input_enabled(&mut self, enabled: bool) {
            self.0.push(format!("input:{enabled}"));
        }
        fn announce_outcome(&mut self, won: bool) {
            self.0.push(format!("outcome:{won}"));
        }
    }

    #[test]
    fn defaults_fall_back_to_status_lines() {
        let mut log = Log::default();
        dispatch(DuelEvent::BoardVisible(false), &mut log);
        dispatch(
            DuelEvent::SendFailed {
                reason: "broken pipe".into(),
            },
            &mut log,
        );
        dispatch(
            DuelEvent::ConnectionFailed {
                reason: "reset".into(),
            },
            &mut log,
        );
        assert_eq!(
            log.0,
            vec![
                "status:Failed to send to the server: broken pipe".to_string(),
                "status:reset".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn drain_preserves_order() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(DuelEvent::status("a")).await.unwrap();
        tx.send(DuelEvent::CellUpdated {
            cell: "c2".into(),
            sign: PlayerSign::O,
        })
        .await
        .unwrap();
        tx.send(DuelEvent::BoardInputEnabled(true)).await.unwrap();
        tx.send(DuelEvent::Outcome { won: true }).await.unwrap();
        drop(tx);

        let mut log = Log::default();
        assert_eq!(drain_events(&mut rx, &mut log).await, 4);
        assert_eq!(
            log.0,
            vec!["status:a", "cell:c2=O", "input:true", "outcome:true"]
        );
    }

    #[tokio::test]
    async fn try_drain_returns_without_waiting() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(DuelEvent::status("only")).await.unwrap();

        let mut log = Log::default();
        assert_eq!(try_drain_events(&mut rx, &mut log), 1);
        assert_eq!(try_drain_events(&mut rx, &mut log), 0);
        drop(tx);
    }
}
