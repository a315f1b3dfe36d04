// The real network transport is an external collaborator (spec §1): "a
// typed RPC substrate with request/response callbacks". This crate only
// needs something that moves opaque byte buffers between sites; the
// framing and request/response semantics live in `wire::Node`.

use std::fmt;

use dashmap::DashMap;
use embergrid_base::{err, Result, SiteId};

/// A transport moves already-encoded frames between sites. A real
/// deployment would implement this over TCP/QUIC/whatever; tests and the
/// single-process demo use `InProcessTransport`.
pub trait Transport: Send + Sync + fmt::Debug {
    fn send_bytes(&self, src: SiteId, dst: SiteId, buf: Box<[u8]>) -> Result<()>;
}

/// Wires multiple `Node`s together within one process via bounded
/// channels, one inbox per registered site. Used by integration tests
/// and by a single-process multi-site demo; a production site would
/// instead register a socket-backed transport.
#[derive(Debug, Default)]
pub struct InProcessTransport {
    inboxes: DashMap<SiteId, crossbeam_channel::Sender<(SiteId, Box<[u8]>)>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        InProcessTransport::default()
    }

    /// Registers `site` with this transport, returning the receiver end
    /// of its inbox. The site's messenger loop should drain this and feed
    /// each buffer into its `Node::recv_bytes`.
    pub fn register(&self, site: SiteId) -> crossbeam_channel::Receiver<(SiteId, Box<[u8]>)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inboxes.insert(site, tx);
        rx
    }

    pub fn unregister(&self, site: SiteId) {
        self.inboxes.remove(&site);
    }
}

impl Transport for InProcessTransport {
    fn send_bytes(&self, src: SiteId, dst: SiteId, buf: Box<[u8]>) -> Result<()> {
        let inbox = self
            .inboxes
            .get(&dst)
            .ok_or_else(|| err(format!("no such site registered with transport: {dst}")))?;
        inbox
            .send((src, buf))
            .map_err(|_| err(format!("site {dst} inbox closed")))
    }
}
