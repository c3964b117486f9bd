use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::feed::{CommentFeed, HubEvent};
use super::protocol::{
    check_handshake, decode, encode, handshake_request, split_records, HubMessage, ProtocolError,
};
use crate::error::{Error, Result};
use crate::model::TemplateId;
use crate::reactive::{ReadSignal, Signal};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = std::result::Result<Option<Value>, ProtocolError>;
type Pending = Arc<DashMap<String, oneshot::Sender<Reply>>>;

const EVENT_CAPACITY: usize = 256;

/// Live comment channel for one template.
///
/// Pushed comments are applied to a [`CommentFeed`] signal and also
/// broadcast as [`HubEvent`]s. The connection is not re-established when it
/// drops; the feed is marked closed and pending invocations fail with
/// [`ProtocolError::ConnectionClosed`].
pub struct CommentHub {
    template_id: TemplateId,
    writer: Arc<Mutex<SplitSink<Socket, Message>>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_invocation: AtomicU64,
    events: broadcast::Sender<HubEvent>,
    feed: Signal<CommentFeed>,
    reader: JoinHandle<()>,
}

impl CommentHub {
    /// Connect, complete the handshake and join the template's group.
    pub async fn connect(
        url: &str,
        template_id: TemplateId,
        access_token: Option<&str>,
    ) -> Result<Self> {
        let url = hub_address(url, access_token)?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(ProtocolError::from)?;
        let (mut writer, mut reader) = socket.split();

        writer
            .send(Message::Text(handshake_request()))
            .await
            .map_err(ProtocolError::from)?;
        let backlog = read_handshake(&mut reader).await?;
        debug!(template_id, "hub handshake complete");

        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let feed = Signal::new(CommentFeed::default());
        let reader = tokio::spawn(run_reader(
            reader,
            backlog,
            pending.clone(),
            closed.clone(),
            events.clone(),
            feed.clone(),
        ));

        let hub = Self {
            template_id,
            writer: Arc::new(Mutex::new(writer)),
            pending,
            closed,
            next_invocation: AtomicU64::new(1),
            events,
            feed,
            reader,
        };
        hub.invoke("JoinGroup", vec![json!(template_id)]).await?;
        Ok(hub)
    }

    pub fn template_id(&self) -> TemplateId {
        self.template_id
    }

    pub fn comments(&self) -> ReadSignal<CommentFeed> {
        self.feed.read_only()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub async fn send_comment(&self, text: &str) -> std::result::Result<(), ProtocolError> {
        self.invoke("SendComment", vec![json!(self.template_id), json!(text)])
            .await
            .map(|_| ())
    }

    /// Call `target` on the hub and wait for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Reply {
        let id = self.next_invocation.fetch_add(1, Ordering::Relaxed).to_string();
        let frame = encode(&HubMessage::invocation(id.clone(), target, arguments))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        // The reader marks the hub closed before draining `pending`.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(ProtocolError::ConnectionClosed);
        }

        trace!(invocation_id = %id, method = target, "hub invoke");
        if let Err(err) = self.writer.lock().await.send(Message::Text(frame)).await {
            self.pending.remove(&id);
            return Err(err.into());
        }
        rx.await.unwrap_or(Err(ProtocolError::ConnectionClosed))
    }

    pub async fn close(&self) -> std::result::Result<(), ProtocolError> {
        self.writer.lock().await.close().await?;
        Ok(())
    }
}

impl Drop for CommentHub {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl fmt::Debug for CommentHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentHub")
            .field("template_id", &self.template_id)
            .field("pending", &self.pending.len())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Wait for the server's handshake record. Records that arrived in the same
/// frame are returned for the reader to process.
async fn read_handshake(
    reader: &mut SplitStream<Socket>,
) -> std::result::Result<Vec<String>, ProtocolError> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut records = split_records(&text);
                let Some(first) = records.next() else {
                    continue;
                };
                check_handshake(first)?;
                return Ok(records.map(str::to_owned).collect());
            }
            Some(Ok(Message::Close(_))) | None => return Err(ProtocolError::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

/// `url` with the access token appended as a percent-encoded query pair.
fn hub_address(url: &str, access_token: Option<&str>) -> Result<String> {
    let Some(token) = access_token else {
        return Ok(url.to_string());
    };
    let mut address =
        reqwest::Url::parse(url).map_err(|e| Error::Config(format!("hub url {url:?}: {e}")))?;
    address.query_pairs_mut().append_pair("access_token", token);
    Ok(address.into())
}

async fn run_reader(
    mut reader: SplitStream<Socket>,
    backlog: Vec<String>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    events: broadcast::Sender<HubEvent>,
    feed: Signal<CommentFeed>,
) {
    let mut open = backlog
        .iter()
        .all(|record| handle_record(record, &pending, &events, &feed));

    while open {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                open = split_records(&text)
                    .all(|record| handle_record(record, &pending, &events, &feed));
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "hub receive failed");
                publish(&events, &feed, HubEvent::Error(err.to_string()));
                break;
            }
        }
    }

    debug!(abandoned = pending.len(), "hub connection closed");
    closed.store(true, Ordering::SeqCst);
    pending.clear();
    publish(&events, &feed, HubEvent::Closed);
}

/// Handle one record; returns whether the connection stays open.
fn handle_record(
    record: &str,
    pending: &Pending,
    events: &broadcast::Sender<HubEvent>,
    feed: &Signal<CommentFeed>,
) -> bool {
    let message = match decode(record) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "dropping hub record");
            return true;
        }
    };

    match message {
        HubMessage::Invocation {
            target, arguments, ..
        } => {
            if let Some(event) = push_event(&target, arguments) {
                publish(events, feed, event);
            }
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => match pending.remove(&invocation_id) {
            Some((_, reply)) => {
                let _ = reply.send(match error {
                    Some(error) => Err(ProtocolError::Invocation(error)),
                    None => Ok(result),
                });
            }
            None => trace!(invocation_id = %invocation_id, "completion for unknown invocation"),
        },
        HubMessage::Ping => trace!("hub ping"),
        HubMessage::Close { error } => {
            if let Some(error) = error {
                publish(events, feed, HubEvent::Error(error));
            }
            return false;
        }
        HubMessage::Unsupported(kind) => trace!(kind, "ignoring hub message"),
    }
    true
}

fn push_event(target: &str, arguments: Vec<Value>) -> Option<HubEvent> {
    let payload = arguments.into_iter().next().unwrap_or(Value::Null);
    let event = match target {
        "ReceiveComments" => serde_json::from_value(payload).map(HubEvent::Initial),
        "ReceiveComment" => serde_json::from_value(payload).map(HubEvent::Comment),
        "ReceiveError" => serde_json::from_value(payload).map(HubEvent::Error),
        other => {
            trace!(method = other, "ignoring hub push");
            return None;
        }
    };
    event
        .inspect_err(|err| warn!(method = target, error = %err, "undecodable hub push"))
        .ok()
}

fn publish(events: &broadcast::Sender<HubEvent>, feed: &Signal<CommentFeed>, event: HubEvent) {
    feed.modify(|state| {
        state.apply(&event);
        true
    });
    // No receivers is fine; the feed signal already has the event.
    let _ = events.send(event);
}
