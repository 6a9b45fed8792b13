//! MSRP transfer session.
//!
//! Outgoing content is cut into SEND chunks of at most `chunk_max_size`
//! bytes. Incoming chunks are answered, reassembled and reported to the
//! [`MsrpEventListener`].

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use rand::Rng;
use rcs_infra_common::config::MsrpSection;
use tracing::{debug, info, trace, warn};

use crate::byte_range::ByteRange;
use crate::chunk::{ContinuationFlag, MsrpHeaders, MsrpRequest, MsrpResponse};
use crate::connection::MsrpConnection;
use crate::constants::*;
use crate::data_chunks::DataChunks;
use crate::error::{Error, Result};
use crate::listener::MsrpEventListener;

// One-shot wake-up between the receive thread and a waiting sender
#[derive(Default)]
struct Signal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn reset(&self) {
        *self.raised.lock() = false;
    }

    fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_all();
    }

    /// True when raised before the timeout
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.raised.lock();
        while !*raised {
            if self.cond.wait_until(&mut raised, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *raised, false)
    }
}

/// One MSRP session over one connection
pub struct MsrpSession {
    config: MsrpSection,
    from: RwLock<Option<String>>,
    to: RwLock<Option<String>>,
    failure_report: AtomicBool,
    success_report: AtomicBool,
    connection: Mutex<Option<Arc<MsrpConnection>>>,
    listener: RwLock<Option<Arc<dyn MsrpEventListener>>>,
    cancelled: AtomicBool,
    response: Signal,
    report: Signal,
    received: Mutex<DataChunks>,
}

impl MsrpSession {
    pub fn new(config: MsrpSection) -> Self {
        Self {
            config,
            from: RwLock::new(None),
            to: RwLock::new(None),
            failure_report: AtomicBool::new(false),
            success_report: AtomicBool::new(false),
            connection: Mutex::new(None),
            listener: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            response: Signal::default(),
            report: Signal::default(),
            received: Mutex::new(DataChunks::new()),
        }
    }

    pub fn config(&self) -> &MsrpSection {
        &self.config
    }

    /// Local MSRP path, sent as From-Path
    pub fn set_from(&self, from: impl Into<String>) {
        *self.from.write() = Some(from.into());
    }

    pub fn from(&self) -> Option<String> {
        self.from.read().clone()
    }

    /// Remote MSRP path, sent as To-Path
    pub fn set_to(&self, to: impl Into<String>) {
        *self.to.write() = Some(to.into());
    }

    pub fn to(&self) -> Option<String> {
        self.to.read().clone()
    }

    /// Ask the peer to answer every chunk; the sender then waits for each answer
    pub fn set_failure_report_option(&self, enabled: bool) {
        self.failure_report.store(enabled, Ordering::Relaxed);
    }

    pub fn is_failure_report_requested(&self) -> bool {
        self.failure_report.load(Ordering::Relaxed)
    }

    /// Ask the peer for a REPORT once the whole message arrived
    pub fn set_success_report_option(&self, enabled: bool) {
        self.success_report.store(enabled, Ordering::Relaxed);
    }

    pub fn is_success_report_requested(&self) -> bool {
        self.success_report.load(Ordering::Relaxed)
    }

    pub fn add_msrp_event_listener(&self, listener: Arc<dyn MsrpEventListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn msrp_event_listener(&self) -> Option<Arc<dyn MsrpEventListener>> {
        self.listener.read().clone()
    }

    pub fn set_connection(&self, connection: Arc<MsrpConnection>) {
        *self.connection.lock() = Some(connection);
    }

    pub fn connection(&self) -> Option<Arc<MsrpConnection>> {
        self.connection.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Abort any transfer, close the connection and release waiting senders
    pub fn close(&self) {
        debug!("Close MSRP session");
        self.cancelled.store(true, Ordering::Release);
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
        }
        self.response.raise();
        self.report.raise();
    }

    fn endpoints(&self) -> Result<(String, String, Arc<MsrpConnection>)> {
        let from = self.from().ok_or(Error::NotConfigured("From"))?;
        let to = self.to().ok_or(Error::NotConfigured("To"))?;
        let connection = self.connection().ok_or(Error::NotConfigured("Connection"))?;
        Ok((from, to, connection))
    }

    fn with_listener(&self, f: impl FnOnce(&dyn MsrpEventListener)) {
        if let Some(listener) = self.msrp_event_listener() {
            f(listener.as_ref());
        }
    }

    /// Send `total_size` bytes read from `input` as one message
    ///
    /// Blocks until every chunk has been queued (and answered, with the
    /// failure report option), then until the success report arrives when
    /// one was requested. A [`close`](Self::close) stops the transfer without
    /// error and without the final callback.
    pub fn send_chunks(
        &self,
        mut input: impl Read,
        content_type: Option<&str>,
        total_size: u64,
    ) -> Result<()> {
        let (from, to, connection) = self.endpoints()?;
        info!("Send content ({} bytes) over MSRP", total_size);

        self.cancelled.store(false, Ordering::Release);
        self.report.reset();

        let failure_report = self.is_failure_report_requested();
        let success_report = self.is_success_report_requested();
        let message_id = generate_id();
        let mut data = vec![0u8; self.config.chunk_max_size.max(1)];
        let mut first_byte = 1u64;
        let mut last_byte = 0u64;

        while !self.is_cancelled() {
            let read = input.read(&mut data)?;
            if read == 0 {
                break;
            }
            last_byte += read as u64;

            let mut request = MsrpRequest::send(
                generate_id(),
                &to,
                &from,
                &message_id,
                ByteRange::new(first_byte, last_byte, total_size),
                Bytes::copy_from_slice(&data[..read]),
            );
            if !failure_report {
                request.headers.push(HEADER_FAILURE_REPORT, "no");
            }
            if success_report {
                request.headers.push(HEADER_SUCCESS_REPORT, "yes");
            }
            if let Some(content_type) = content_type {
                request.headers.push(HEADER_CONTENT_TYPE, content_type);
            }

            self.response.reset();
            connection.send_chunk(request.encode())?;
            if failure_report && !self.response.wait(self.config.response_timeout()) {
                warn!("No response to MSRP chunk {}", request.transaction_id);
            }

            first_byte += read as u64;
            if !self.is_cancelled() {
                self.with_listener(|l| l.msrp_transfer_progress(last_byte, total_size));
            }
        }

        if self.is_cancelled() {
            info!("MSRP transfer aborted");
            return Ok(());
        }

        if success_report {
            debug!("Wait for the MSRP success report");
            if !self.report.wait(self.config.response_timeout()) {
                warn!("No MSRP success report received");
            }
            if self.is_cancelled() {
                return Ok(());
            }
        }

        self.with_listener(|l| l.msrp_data_transfered());
        Ok(())
    }

    /// Send a SEND without body, letting the peer bind the connection
    pub fn send_empty_chunk(&self) -> Result<()> {
        let (from, to, connection) = self.endpoints()?;
        debug!("Send an empty MSRP chunk");
        let request = MsrpRequest::empty_send(generate_id(), &to, &from, &generate_id());
        connection.send_chunk(request.encode())
    }

    fn send_response(&self, response: MsrpResponse) -> Result<()> {
        let connection = self.connection().ok_or(Error::ConnectionClosed)?;
        connection.send_chunk(response.encode())
    }

    /// Handle a received SEND chunk
    pub fn receive_msrp_send(
        &self,
        transaction_id: &str,
        headers: &MsrpHeaders,
        flag: ContinuationFlag,
        data: Option<Bytes>,
        total_size: Option<u64>,
    ) -> Result<()> {
        let data = match data {
            Some(data) => data,
            None => {
                debug!("Empty MSRP chunk {} ignored", transaction_id);
                return Ok(());
            }
        };
        trace!("MSRP chunk {} of {} bytes received", transaction_id, data.len());

        let failure_report_needed = !headers
            .get(HEADER_FAILURE_REPORT)
            .is_some_and(|value| value.eq_ignore_ascii_case("no"));
        if failure_report_needed {
            self.send_response(MsrpResponse::ok(transaction_id, headers))?;
        }

        let total = total_size.unwrap_or(0);
        match flag {
            ContinuationFlag::Last => {
                let content = {
                    let mut received = self.received.lock();
                    received.add_chunk(&data);
                    received.take()
                };
                info!("MSRP message of {} bytes received", content.len());
                let length = content.len() as u64;
                self.with_listener(|l| l.msrp_data_received(content, headers.get(HEADER_CONTENT_TYPE)));

                let success_report_needed = headers
                    .get(HEADER_SUCCESS_REPORT)
                    .is_some_and(|value| value.eq_ignore_ascii_case("yes"));
                if success_report_needed {
                    let report = MsrpRequest::success_report(generate_id(), headers, length, total.max(length));
                    let connection = self.connection().ok_or(Error::ConnectionClosed)?;
                    connection.send_chunk(report.encode())?;
                }
            }
            ContinuationFlag::Abort => {
                self.received.lock().reset();
                info!("MSRP transfer aborted by the peer");
                self.with_listener(|l| l.msrp_transfer_aborted());
            }
            ContinuationFlag::More => {
                let current = {
                    let mut received = self.received.lock();
                    received.add_chunk(&data);
                    received.current_size()
                };
                self.with_listener(|l| l.msrp_transfer_progress(current, total));
            }
        }
        Ok(())
    }

    /// Handle a response to one of our chunks
    pub fn receive_msrp_response(&self, code: u16, transaction_id: &str, _headers: &MsrpHeaders) {
        trace!("MSRP response {} to {}", code, transaction_id);
        self.response.raise();
        if code != RESPONSE_OK {
            warn!("MSRP chunk {} rejected with {}", transaction_id, code);
            self.with_listener(|l| l.msrp_transfer_error(&format!("{} response received", code)));
        }
    }

    /// Handle a REPORT; it is answered and releases a sender waiting for it
    pub fn receive_msrp_report(&self, transaction_id: &str, headers: &MsrpHeaders) -> Result<()> {
        debug!("MSRP report {} received", transaction_id);
        let result = self.send_response(MsrpResponse::ok(transaction_id, headers));
        self.report.raise();
        result
    }
}

impl std::fmt::Debug for MsrpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsrpSession")
            .field("from", &self.from())
            .field("to", &self.to())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Random transaction or message identifier
pub fn generate_id() -> String {
    format!("{:x}", rand::thread_rng().gen::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkDecoder, MsrpChunk};
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl MsrpEventListener for Recorder {
        fn msrp_data_received(&self, data: Bytes, mime_type: Option<&str>) {
            self.events.lock().push(format!(
                "data:{}:{}",
                String::from_utf8_lossy(&data),
                mime_type.unwrap_or("-")
            ));
        }

        fn msrp_transfer_progress(&self, current: u64, total: u64) {
            self.events.lock().push(format!("progress:{}/{}", current, total));
        }

        fn msrp_transfer_aborted(&self) {
            self.events.lock().push("aborted".into());
        }

        fn msrp_transfer_error(&self, error: &str) {
            self.events.lock().push(format!("error:{}", error));
        }

        fn msrp_data_transfered(&self) {
            self.events.lock().push("transfered".into());
        }
    }

    // A session whose outgoing chunks land on a raw peer socket
    fn connected_session(config: MsrpSection) -> (Arc<MsrpSession>, TcpStream, Arc<Recorder>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = thread::spawn(move || listener.accept().unwrap().0);

        let session = Arc::new(MsrpSession::new(config));
        session.set_from("msrp://127.0.0.1/local;tcp");
        session.set_to("msrp://127.0.0.1/remote;tcp");
        let recorder = Arc::new(Recorder::default());
        session.add_msrp_event_listener(recorder.clone());
        MsrpConnection::connect(addr, session.clone()).unwrap();

        (session, peer.join().unwrap(), recorder)
    }

    fn send_headers(extra: &[(&str, &str)]) -> MsrpHeaders {
        let mut headers = MsrpHeaders::new()
            .with(HEADER_TO_PATH, "msrp://127.0.0.1/local;tcp")
            .with(HEADER_FROM_PATH, "msrp://127.0.0.1/remote;tcp")
            .with(HEADER_MESSAGE_ID, "m1");
        for (name, value) in extra {
            headers.push(*name, *value);
        }
        headers
    }

    #[test]
    fn test_send_requires_paths_and_connection() {
        let session = MsrpSession::new(MsrpSection::default());
        assert!(matches!(
            session.send_empty_chunk(),
            Err(Error::NotConfigured("From"))
        ));
        session.set_from("a");
        assert!(matches!(
            session.send_chunks(Cursor::new(b"x".to_vec()), None, 1),
            Err(Error::NotConfigured("To"))
        ));
        session.set_to("b");
        assert!(matches!(session.send_empty_chunk(), Err(Error::NotConfigured("Connection"))));
    }

    #[test]
    fn test_send_chunks_splits_content() {
        let config = MsrpSection {
            chunk_max_size: 4,
            ..Default::default()
        };
        let (session, peer, recorder) = connected_session(config);

        session
            .send_chunks(Cursor::new(b"0123456789".to_vec()), Some("text/plain"), 10)
            .unwrap();

        let mut decoder = ChunkDecoder::new(std::io::BufReader::new(peer));
        let mut ranges = Vec::new();
        let mut content = Vec::new();
        for _ in 0..3 {
            match decoder.read_chunk().unwrap().unwrap() {
                MsrpChunk::Request(request) => {
                    assert_eq!(request.headers.get(HEADER_FAILURE_REPORT), Some("no"));
                    assert_eq!(request.headers.get(HEADER_CONTENT_TYPE), Some("text/plain"));
                    ranges.push(request.headers.get(HEADER_BYTE_RANGE).unwrap().to_string());
                    content.extend_from_slice(&request.data.unwrap());
                    if ranges.len() == 3 {
                        assert_eq!(request.flag, ContinuationFlag::Last);
                    }
                }
                other => panic!("unexpected chunk {:?}", other),
            }
        }
        assert_eq!(ranges, vec!["1-4/10", "5-8/10", "9-10/10"]);
        assert_eq!(&content[..], b"0123456789");

        assert_eq!(
            *recorder.events.lock(),
            vec!["progress:4/10", "progress:8/10", "progress:10/10", "transfered"]
        );
        session.close();
    }

    #[test]
    fn test_receive_chunks_reassembles_and_answers() {
        let (session, peer, recorder) = connected_session(MsrpSection::default());

        session
            .receive_msrp_send("t1", &send_headers(&[]), ContinuationFlag::More, Some(Bytes::from_static(b"hel")), Some(5))
            .unwrap();
        session
            .receive_msrp_send(
                "t2",
                &send_headers(&[(HEADER_CONTENT_TYPE, "text/plain"), (HEADER_SUCCESS_REPORT, "yes")]),
                ContinuationFlag::Last,
                Some(Bytes::from_static(b"lo")),
                Some(5),
            )
            .unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["progress:3/5", "data:hello:text/plain"]
        );

        let mut decoder = ChunkDecoder::new(std::io::BufReader::new(peer));
        let mut seen = Vec::new();
        for _ in 0..3 {
            match decoder.read_chunk().unwrap().unwrap() {
                MsrpChunk::Response(response) => seen.push(format!("{} {}", response.code, response.transaction_id)),
                MsrpChunk::Request(request) => {
                    assert!(request.is_report());
                    assert_eq!(request.headers.get(HEADER_BYTE_RANGE), Some("1-5/5"));
                    seen.push("REPORT".to_string());
                }
            }
        }
        assert_eq!(seen, vec!["200 t1", "200 t2", "REPORT"]);
        session.close();
    }

    #[test]
    fn test_failure_report_no_suppresses_response() {
        let (session, peer, recorder) = connected_session(MsrpSection::default());
        session
            .receive_msrp_send(
                "quiet",
                &send_headers(&[(HEADER_FAILURE_REPORT, "no")]),
                ContinuationFlag::Last,
                Some(Bytes::from_static(b"x")),
                Some(1),
            )
            .unwrap();
        session.send_empty_chunk().unwrap();

        // The first chunk the peer sees is the empty SEND, not a response
        let mut decoder = ChunkDecoder::new(std::io::BufReader::new(peer));
        assert!(matches!(decoder.read_chunk().unwrap(), Some(MsrpChunk::Request(_))));
        assert_eq!(recorder.events.lock().len(), 1);
        session.close();
    }

    #[test]
    fn test_abort_and_error_callbacks() {
        let session = MsrpSession::new(MsrpSection::default());
        let recorder = Arc::new(Recorder::default());
        session.add_msrp_event_listener(recorder.clone());

        let headers = send_headers(&[(HEADER_FAILURE_REPORT, "no")]);
        session
            .receive_msrp_send("a", &headers, ContinuationFlag::Abort, Some(Bytes::from_static(b"zz")), None)
            .unwrap();
        session.receive_msrp_send("b", &headers, ContinuationFlag::Last, None, None).unwrap();
        session.receive_msrp_response(481, "c", &MsrpHeaders::new());
        session.receive_msrp_response(200, "d", &MsrpHeaders::new());

        assert_eq!(
            *recorder.events.lock(),
            vec!["aborted", "error:481 response received"]
        );
    }

    #[test]
    fn test_close_releases_waiting_sender() {
        let config = MsrpSection {
            chunk_max_size: 2,
            response_timeout_secs: 30,
            ..Default::default()
        };
        let (session, _peer, recorder) = connected_session(config);
        session.set_failure_report_option(true);

        let sender = {
            let session = session.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = session.send_chunks(Cursor::new(b"abcdef".to_vec()), None, 6);
                (result, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(100));
        session.close();

        let (result, elapsed) = sender.join().unwrap();
        assert!(result.is_ok());
        assert!(elapsed < Duration::from_secs(5));
        assert!(!recorder.events.lock().iter().any(|e| e == "transfered"));
    }

    #[test]
    fn test_generate_id_is_hex() {
        let id = generate_id();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_id(), generate_id());
    }
}
