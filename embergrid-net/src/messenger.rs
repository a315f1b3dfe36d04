use std::sync::Arc;
use std::time::Duration;

use embergrid_base::{Result, SiteId};
use parking_lot::Mutex;

use crate::messages::{
    ClientResponse, CoordinatorRequest, CoordinatorResponse, DependencySet, FinishRequest,
    FinishResponse, FragmentResponse, PrepareRequest, PrepareResponse, WorkMessage,
};
use crate::transport::Transport;
use crate::wire::{Frame, Node, RecvFrame, WireBody};

/// Ties one site's `Node` framing to a `Transport` and an inbox receiver,
/// giving callers typed send methods and a poll loop that turns decoded
/// frames into `RecvFrame`s. A site runs one `Messenger` per peer-facing
/// direction; the mutex exists because the supervisor's housekeeping
/// threads and the executor threads may each want to send concurrently,
/// while decoding (via `poll`) happens on a single dedicated thread.
#[derive(Debug)]
pub struct Messenger {
    node: Mutex<Node>,
    transport: Arc<dyn Transport>,
    inbox: crossbeam_channel::Receiver<(SiteId, Box<[u8]>)>,
}

impl Messenger {
    pub fn new(
        id: SiteId,
        transport: Arc<dyn Transport>,
        inbox: crossbeam_channel::Receiver<(SiteId, Box<[u8]>)>,
    ) -> Self {
        Messenger {
            node: Mutex::new(Node::new(id)),
            transport,
            inbox,
        }
    }

    fn flush_outgoing(&self, src: SiteId, node: &mut Node) -> Result<()> {
        while let Some((dst, buf)) = node.send_bytes() {
            self.transport.send_bytes(src, dst, buf)?;
        }
        Ok(())
    }

    pub fn send_work(&self, dst: SiteId, msg: WorkMessage) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::Work(msg))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_redirect(&self, dst: SiteId, msg: WorkMessage) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::Redirect(msg))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_fragment_response(&self, dst: SiteId, resp: FragmentResponse) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::FragmentResponse(resp))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_dependency_set(&self, dst: SiteId, deps: DependencySet) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::DependencySet(deps))?;
        self.flush_outgoing(src, &mut node)
    }

    /// Sends a coordinator request, returning the sequence number the
    /// eventual `CoordinatorResponse` will be paired against.
    pub fn send_coordinator_request(&self, dst: SiteId, req: CoordinatorRequest) -> Result<u64> {
        let mut node = self.node.lock();
        let src = node.id();
        let seq = node.send_request(dst, WireBody::CoordinatorRequest(req))?;
        self.flush_outgoing(src, &mut node)?;
        Ok(seq)
    }

    pub fn send_coordinator_response(
        &self,
        dst: SiteId,
        sequence: u64,
        resp: CoordinatorResponse,
    ) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_response(dst, sequence, WireBody::CoordinatorResponse(resp))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_client_response(&self, dst: SiteId, resp: ClientResponse) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::ClientResponse(resp))?;
        self.flush_outgoing(src, &mut node)
    }

    /// 2PC wave sends: each is addressed to a single partition and
    /// acknowledged the same way, so unlike `CoordinatorRequest` these
    /// don't need the `Node`'s request/response pairing -- the
    /// executor's own `PrepareCallback`/`FinishCallback` does the
    /// counting.
    pub fn send_prepare_request(&self, dst: SiteId, req: PrepareRequest) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::PrepareRequest(req))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_prepare_response(&self, dst: SiteId, resp: PrepareResponse) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::PrepareResponse(resp))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_finish_request(&self, dst: SiteId, req: FinishRequest) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::FinishRequest(req))?;
        self.flush_outgoing(src, &mut node)
    }

    pub fn send_finish_response(&self, dst: SiteId, resp: FinishResponse) -> Result<()> {
        let mut node = self.node.lock();
        let src = node.id();
        node.send_oneway(dst, WireBody::FinishResponse(resp))?;
        self.flush_outgoing(src, &mut node)
    }

    /// Drains whatever inbox bytes are currently queued (non-blocking) and
    /// returns every frame or paired request/response that becomes
    /// decodable as a result.
    pub fn poll(&self) -> Vec<RecvFrame> {
        let mut node = self.node.lock();
        while let Ok((src, buf)) = self.inbox.try_recv() {
            node.recv_bytes(src, buf);
        }
        self.drain_decoded(&mut node)
    }

    /// Same as `poll` but blocks up to `timeout` for the first inbox
    /// message, matching the executor main loop's bounded work-queue
    /// poll (spec §4.4.1).
    pub fn poll_timeout(&self, timeout: Duration) -> Vec<RecvFrame> {
        let mut node = self.node.lock();
        match self.inbox.recv_timeout(timeout) {
            Ok((src, buf)) => node.recv_bytes(src, buf),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => return Vec::new(),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return Vec::new(),
        }
        while let Ok((src, buf)) = self.inbox.try_recv() {
            node.recv_bytes(src, buf);
        }
        self.drain_decoded(&mut node)
    }

    fn drain_decoded(&self, node: &mut Node) -> Vec<RecvFrame> {
        let mut out = Vec::new();
        loop {
            match node.recv_frame() {
                Ok(RecvFrame::NoFrames) => break,
                Ok(frame) => out.push(frame),
                Err(e) => {
                    tracing::error!(target: "embergrid", error = ?e, "dropping malformed frame");
                    break;
                }
            }
        }
        out
    }
}

/// Convenience accessor for tests that want to inspect a raw frame body.
pub fn body_of(frame: &Frame) -> &WireBody {
    &frame.body
}
