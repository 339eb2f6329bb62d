//! One running group member.

use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use paxos_rs::{PaxosMachine, Receiver, Snapshot};
use px_data::{GroupMembership, LogicalTime, MembershipErr, MsgId, MsgIdGenerator, Payload};

use crate::config::GroupConfig;
use crate::timer::WaitingTimer;
use crate::transport::{Transport, TransportComm, TransportErr, UdpTransport};
use crate::utils::{elapsed_ms, lock};

pub type TchanR<T> = mpsc::Receiver<T>;
pub type TchanS<T> = mpsc::Sender<T>;
pub type CtlRecvr = broadcast::Receiver<()>;
pub type CtlSender = broadcast::Sender<()>;

#[derive(Debug, Error)]
pub enum GroupErr {
    #[error("{0}")]
    Membership(#[from] MembershipErr),

    #[error("{0}")]
    Transport(#[from] TransportErr),

    #[error("group closed")]
    Closed,
}

/// Inputs of the dispatcher, which owns the protocol state.
#[derive(Debug)]
enum Event {
    Datagram(Vec<u8>),
    Tick(LogicalTime),
    Broadcast(Payload, MsgId),
    Status(oneshot::Sender<Snapshot>),
}

pub struct PaxosGroup {
    membership: Arc<GroupMembership>,
    transport: Arc<dyn Transport>,
    timer: Arc<WaitingTimer>,
    ids: MsgIdGenerator,

    event_sender: TchanS<Event>,
    io_quit: CtlSender,
    core_quit: CtlSender,
    io_tasks: Mutex<Vec<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PaxosGroup {
    /// Spawns the receive loop, the ticker and the dispatcher on the current runtime.
    pub async fn start(
        membership: GroupMembership,
        transport: Arc<dyn Transport>,
        receiver: Box<dyn Receiver>,
        config: GroupConfig,
    ) -> Result<Self, GroupErr> {
        let me = *membership.me();
        if transport.local() != me {
            warn!("transport bound to {}, announced as {}", transport.local(), me);
        }
        let membership = Arc::new(membership);
        let timer = Arc::new(WaitingTimer::new(config.wait_timeout()));
        let (event_sender, event_recvr) = mpsc::channel(config.channel_size.max(1));
        let (io_quit, _) = broadcast::channel(1);
        let (core_quit, _) = broadcast::channel(1);

        let start = Instant::now();
        let machine = PaxosMachine::new(
            membership.clone(),
            Arc::new(TransportComm(transport.clone())),
            receiver,
            timer.clone(),
            config.paxos,
            elapsed_ms(&start),
        );

        let io_tasks = vec![
            tokio::spawn(recv_loop(
                transport.clone(),
                event_sender.clone(),
                io_quit.subscribe(),
            )),
            tokio::spawn(tick_loop(
                start,
                config,
                event_sender.clone(),
                io_quit.subscribe(),
            )),
        ];
        let dispatcher = tokio::spawn(dispatch_loop(machine, event_recvr, core_quit.subscribe()));
        info!(
            "{} joined group of {}, position {}",
            me,
            membership.group_size(),
            membership.position_in_group()
        );

        Ok(Self {
            ids: MsgIdGenerator::new(membership.position_in_group()),
            membership,
            transport,
            timer,
            event_sender,
            io_quit,
            core_quit,
            io_tasks: Mutex::new(io_tasks),
            dispatcher: Mutex::new(Some(dispatcher)),
            closed: AtomicBool::new(false),
        })
    }

    /// Binds a UDP socket on the member at `position` of `members` and starts.
    pub async fn start_udp(
        members: Vec<px_data::Member>,
        position: usize,
        receiver: Box<dyn Receiver>,
        config: GroupConfig,
    ) -> Result<Self, GroupErr> {
        let membership = GroupMembership::with_position(members, position)?;
        let transport = UdpTransport::bind(membership.me(), config.max_datagram_size).await?;
        Self::start(membership, Arc::new(transport), receiver, config).await
    }

    /// Orders `message` in the group and returns once it is committed
    /// locally. Retries through the current leader until then.
    pub async fn broadcast(&self, message: Vec<u8>) -> Result<MsgId, GroupErr> {
        let msg_id = self.ids.next_id();
        let payload = Payload::App(message);
        let notify = self.timer.register(msg_id);

        let res = loop {
            if self.is_closed() {
                break Err(GroupErr::Closed);
            }
            if self
                .event_sender
                .send(Event::Broadcast(payload.clone(), msg_id))
                .await
                .is_err()
            {
                break Err(GroupErr::Closed);
            }
            if self.timer.wait_a_little(&notify).await {
                break Ok(msg_id);
            }
            debug!("{} not committed yet, retry", msg_id);
        };
        self.timer.deregister(msg_id);
        res
    }

    pub async fn status(&self) -> Result<Snapshot, GroupErr> {
        let (tx, rx) = oneshot::channel();
        self.event_sender
            .send(Event::Status(tx))
            .await
            .map_err(|_| GroupErr::Closed)?;
        rx.await.map_err(|_| GroupErr::Closed)
    }

    /// Stops network input and ticks, then the dispatcher, then the transport.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let me = self.membership.me();
        info!("{} leaving group", me);

        let _ = self.io_quit.send(());
        let io_tasks = std::mem::take(&mut *lock(&self.io_tasks));
        for res in join_all(io_tasks).await {
            if let Err(e) = res {
                error!("{} io task: {}", me, e);
            }
        }

        let _ = self.core_quit.send(());
        let dispatcher = lock(&self.dispatcher).take();
        if let Some(h) = dispatcher {
            if let Err(e) = h.await {
                error!("{} dispatcher: {}", me, e);
            }
        }

        self.transport.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn membership(&self) -> &GroupMembership {
        &self.membership
    }
}

async fn recv_loop(transport: Arc<dyn Transport>, events: TchanS<Event>, mut quit: CtlRecvr) {
    debug!("receiver up");
    loop {
        tokio::select! {
            _ = quit.recv() => break,
            r = transport.recv() => match r {
                Ok((_, buf)) => {
                    if events.send(Event::Datagram(buf)).await.is_err() {
                        break;
                    }
                }
                Err(TransportErr::Closed) => break,
                Err(e) => warn!("recv failed: {}", e),
            },
        }
    }
    debug!("receiver down");
}

async fn tick_loop(start: Instant, config: GroupConfig, events: TchanS<Event>, mut quit: CtlRecvr) {
    let mut interval = tokio::time::interval(config.tick_interval());
    loop {
        tokio::select! {
            _ = quit.recv() => break,
            _ = interval.tick() => {
                if events.send(Event::Tick(elapsed_ms(&start))).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("ticker down");
}

async fn dispatch_loop(mut machine: PaxosMachine, mut events: TchanR<Event>, mut quit: CtlRecvr) {
    info!("machine up");
    loop {
        tokio::select! {
            _ = quit.recv() => break,
            ev = events.recv() => match ev {
                Some(Event::Datagram(buf)) => {
                    if let Err(e) = machine.process_bytes(&buf) {
                        warn!("drop datagram: {}", e);
                    }
                }
                Some(Event::Tick(time)) => machine.on_tick(time),
                Some(Event::Broadcast(payload, msg_id)) => machine.forward_broadcast(payload, msg_id),
                Some(Event::Status(tx)) => {
                    let _ = tx.send(machine.snapshot());
                }
                None => break,
            },
        }
    }
    info!("machine down");
}
