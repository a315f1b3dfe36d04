// Each message sent or received turns into a single byte buffer added to
// the outgoing or incoming queue of a `Node`: a transport-agnostic
// request/response pairing layer, with the actual bytes-on-the-wire
// framing left to whatever `Transport` impl moves buffers between sites
// (see `transport.rs`).

use std::collections::{BTreeMap, VecDeque};

use embergrid_base::{err, PartitionId, Result, SiteId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::messages::{
    ClientResponse, CoordinatorRequest, CoordinatorResponse, DependencySet, FinishRequest,
    FinishResponse, FragmentResponse, PrepareRequest, PrepareResponse, WorkMessage,
};

/// The full set of message bodies that can cross a site-to-site wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WireBody {
    Work(WorkMessage),
    FragmentResponse(FragmentResponse),
    DependencySet(DependencySet),
    CoordinatorRequest(CoordinatorRequest),
    CoordinatorResponse(CoordinatorResponse),
    ClientResponse(ClientResponse),
    PrepareRequest(PrepareRequest),
    PrepareResponse(PrepareResponse),
    FinishRequest(FinishRequest),
    FinishResponse(FinishResponse),
    /// A client request arrived at a site that doesn't own the
    /// transaction's base partition; redirected via `RedirectCallback`.
    Redirect(WorkMessage),
}

/// A frame adds routing and request/response pairing on top of a body.
/// `sequence` is assigned by the sender; a response frame echoes the
/// sequence of the request it answers and sets `response = true`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub src: SiteId,
    pub dst: SiteId,
    pub sequence: u64,
    pub response: bool,
    pub body: WireBody,
}

#[derive(Debug, Default)]
struct IOQueues {
    outgoing: VecDeque<(SiteId, Box<[u8]>)>,
    incoming: VecDeque<(SiteId, Box<[u8]>)>,
}

#[derive(Debug)]
struct PendingRequest {
    req: Box<Frame>,
    res: Option<Box<Frame>>,
}

#[derive(Debug, Default)]
pub enum RecvFrame {
    #[default]
    NoFrames,
    Single(Box<Frame>),
    Paired {
        req: Box<Frame>,
        res: Box<Frame>,
    },
}

/// One site's endpoint of the wire protocol: tracks in-flight requests by
/// sequence number, decodes incoming bytes, and hands complete
/// request/response pairs (or unsolicited one-way frames) to the caller.
#[derive(Debug, Default)]
pub struct Node {
    id: SiteId,
    next_sequence: u64,
    incoming: VecDeque<Box<Frame>>,
    requests: BTreeMap<u64, PendingRequest>,
    complete: VecDeque<u64>,
    ioqueues: IOQueues,
    /// Toggled by `recv_frame` so one-way frames and completed
    /// request/response pairs take turns rather than one starving the
    /// other when both queues have content.
    favor_complete: bool,
}

impl Node {
    pub fn new(id: SiteId) -> Self {
        Node {
            id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    /// Send a one-way message with no expected response (e.g. a fire and
    /// forget `FragmentResponse`).
    pub fn send_oneway(&mut self, dst: SiteId, body: WireBody) -> Result<()> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.send_frame(Frame {
            src: self.id,
            dst,
            sequence,
            response: false,
            body,
        })
    }

    /// Send a request, remembering its sequence so a later response can be
    /// paired with it by `recv_frame`.
    pub fn send_request(&mut self, dst: SiteId, body: WireBody) -> Result<u64> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let frame = Frame {
            src: self.id,
            dst,
            sequence,
            response: false,
            body,
        };
        self.requests.insert(
            sequence,
            PendingRequest {
                req: Box::new(frame.clone()),
                res: None,
            },
        );
        self.send_frame(frame)?;
        Ok(sequence)
    }

    /// Answer an earlier request, echoing its sequence.
    pub fn send_response(&mut self, dst: SiteId, sequence: u64, body: WireBody) -> Result<()> {
        self.send_frame(Frame {
            src: self.id,
            dst,
            sequence,
            response: true,
            body,
        })
    }

    fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let dst = frame.dst;
        let buf = rmp_serde::to_vec(&frame)?;
        self.ioqueues
            .outgoing
            .push_back((dst, buf.into_boxed_slice()));
        Ok(())
    }

    /// Drain one queued byte buffer (if any) into the decoded queues, then
    /// return the next frame or paired request/response ready for the
    /// caller. When both one-way frames and completed request/response
    /// pairs are waiting, alternates between the two so neither queue can
    /// starve the other.
    pub fn recv_frame(&mut self) -> Result<RecvFrame> {
        if self.incoming.is_empty() && self.complete.is_empty() {
            if let Some((src, buf)) = self.ioqueues.incoming.pop_front() {
                self.decode_frame(src, buf)?;
            }
        }

        let prefer_incoming = !self.favor_complete || self.complete.is_empty();
        if prefer_incoming && !self.incoming.is_empty() {
            self.favor_complete = true;
            return Ok(RecvFrame::Single(self.incoming.pop_front().unwrap()));
        }
        if let Some(seq) = self.complete.pop_front() {
            self.favor_complete = false;
            let pending = self
                .requests
                .remove(&seq)
                .ok_or_else(|| err("missing request for completed sequence"))?;
            let res = pending
                .res
                .ok_or_else(|| err("completed sequence has no response"))?;
            return Ok(RecvFrame::Paired {
                req: pending.req,
                res,
            });
        }
        if let Some(frame) = self.incoming.pop_front() {
            return Ok(RecvFrame::Single(frame));
        }
        Ok(RecvFrame::NoFrames)
    }

    pub fn recv_bytes(&mut self, src: SiteId, buf: Box<[u8]>) {
        self.ioqueues.incoming.push_back((src, buf));
    }

    pub fn send_bytes(&mut self) -> Option<(SiteId, Box<[u8]>)> {
        self.ioqueues.outgoing.pop_front()
    }

    fn decode_frame(&mut self, src: SiteId, buf: Box<[u8]>) -> Result<()> {
        let frame: Box<Frame> = Box::new(rmp_serde::from_slice(buf.as_ref())?);
        if frame.src != src {
            return Err(err("mismatched frame source"));
        }
        if frame.response {
            let sequence = frame.sequence;
            match self.requests.get_mut(&sequence) {
                Some(pending) if pending.res.is_some() => {
                    return Err(err("duplicate response"));
                }
                Some(pending) => {
                    pending.res = Some(frame);
                    self.complete.push_back(sequence);
                }
                None => return Err(err("response for unknown request")),
            }
        } else {
            self.incoming.push_back(frame);
        }
        Ok(())
    }
}
