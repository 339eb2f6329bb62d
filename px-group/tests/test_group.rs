use std::sync::{Arc, Mutex};
use std::time::Duration;

use paxos_rs::{PaxosConfig, Receiver};
use px_data::{GroupMembership, Member, Payload, SeqNo};
use px_group::*;
use simplelog::*;

type Delivered = Arc<Mutex<Vec<(SeqNo, Payload)>>>;

const DEBUG_MODE: bool = false;

fn init_logger() {
    if DEBUG_MODE {
        let _ = TermLogger::init(LevelFilter::Debug, Config::default(), TerminalMode::Mixed);
    }
}

struct Collector(Delivered);

impl Receiver for Collector {
    fn receive(&mut self, seq_no: SeqNo, message: &Payload) {
        self.0.lock().unwrap().push((seq_no, message.clone()));
    }
}

fn fast_config() -> GroupConfig {
    GroupConfig {
        paxos: PaxosConfig {
            heartbeat_interval: 50,
            failure_timeout: 300,
            resend_interval: 100,
        },
        tick_interval_ms: 10,
        wait_timeout_ms: 200,
        ..GroupConfig::default()
    }
}

fn member(i: usize) -> Member {
    format!("127.0.0.1:{}", 2440 + i).parse().unwrap()
}

fn app_payloads(d: &Delivered) -> Vec<Payload> {
    d.lock()
        .unwrap()
        .iter()
        .filter(|(_, p)| !p.is_no_op())
        .map(|(_, p)| p.clone())
        .collect()
}

async fn start_group(net: &MemNetwork, n: usize) -> (Vec<PaxosGroup>, Vec<Delivered>) {
    let transports = (0..n).map(|i| net.transport(member(i))).collect::<Vec<_>>();
    let mut groups = Vec::new();
    let mut delivered = Vec::new();
    for (i, t) in transports.into_iter().enumerate() {
        let d = Delivered::default();
        let ms = GroupMembership::new((0..n).map(member), member(i)).unwrap();
        let g = PaxosGroup::start(ms, t, Box::new(Collector(d.clone())), fast_config())
            .await
            .unwrap();
        groups.push(g);
        delivered.push(d);
    }
    (groups, delivered)
}

/// Polls until every listed member has delivered `expected` app payloads.
async fn wait_delivered(delivered: &[Delivered], members: &[usize], expected: usize) {
    let poll = async {
        loop {
            if members
                .iter()
                .all(|i| app_payloads(&delivered[*i]).len() >= expected)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("delivery timed out");
}

#[tokio::test]
async fn test_broadcast_from_every_member() {
    init_logger();
    let net = MemNetwork::new();
    let (groups, delivered) = start_group(&net, 3).await;

    for (i, g) in groups.iter().enumerate() {
        let id = g.broadcast(format!("put k{} v", i).into_bytes()).await.unwrap();
        assert_eq!(id, i as u64 * 1_000_000 + 1);
    }
    wait_delivered(&delivered, &[0, 1, 2], 3).await;

    let first = delivered[0].lock().unwrap().clone();
    for d in &delivered[1..] {
        assert_eq!(*d.lock().unwrap(), first);
    }

    let status = groups[0].status().await.unwrap();
    assert_eq!(status.leader, member(2));
    assert_eq!(status.view_number, 5);
    assert!(groups[2].status().await.unwrap().elected);

    for g in groups.iter() {
        g.close().await;
    }
}

#[tokio::test]
async fn test_leader_failover() {
    init_logger();
    let net = MemNetwork::new();
    let (groups, delivered) = start_group(&net, 3).await;

    groups[0].broadcast(b"before".to_vec()).await.unwrap();

    groups[2].close().await;
    net.isolate(&member(2));

    let after = tokio::time::timeout(Duration::from_secs(10), groups[0].broadcast(b"after".to_vec()))
        .await
        .expect("no failover");
    assert!(after.is_ok());

    wait_delivered(&delivered, &[0, 1], 2).await;
    assert_eq!(
        app_payloads(&delivered[1]),
        vec![Payload::app("before"), Payload::app("after")]
    );

    let status = groups[1].status().await.unwrap();
    assert!(status.elected);
    assert_eq!(status.leader, member(1));
    assert!(!status.alive.contains(&member(2)));

    groups[0].close().await;
    groups[1].close().await;
}

#[tokio::test]
async fn test_lossy_network_keeps_order() {
    init_logger();
    let net = MemNetwork::with_loss(0.2);
    let (groups, delivered) = start_group(&net, 3).await;

    for k in 0..5 {
        tokio::time::timeout(
            Duration::from_secs(10),
            groups[k % 3].broadcast(format!("m{}", k).into_bytes()),
        )
        .await
        .expect("broadcast stuck")
        .unwrap();
    }
    wait_delivered(&delivered, &[0, 1, 2], 5).await;

    let expected = (0..5)
        .map(|k| Payload::app(format!("m{}", k)))
        .collect::<Vec<_>>();
    for d in delivered.iter() {
        assert_eq!(app_payloads(d), expected);
    }
    for g in groups.iter() {
        g.close().await;
    }
}

#[tokio::test]
async fn test_closed_group_rejects() {
    let net = MemNetwork::new();
    let (groups, _) = start_group(&net, 1).await;
    groups[0].broadcast(b"solo".to_vec()).await.unwrap();

    groups[0].close().await;
    assert!(groups[0].is_closed());
    assert!(matches!(
        groups[0].broadcast(b"late".to_vec()).await,
        Err(GroupErr::Closed)
    ));
    assert!(groups[0].status().await.is_err());
    // idempotent
    groups[0].close().await;
}

#[tokio::test]
async fn test_udp_transport() {
    let any: Member = "127.0.0.1:0".parse().unwrap();
    let a = UdpTransport::bind(&any, 64 * 1024).await.unwrap();
    let b = UdpTransport::bind(&any, 64 * 1024).await.unwrap();
    assert_ne!(a.local().port(), 0);

    a.send_to(&b.local(), b"hello");
    let (from, buf) = tokio::time::timeout(Duration::from_secs(5), b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, a.local());
    assert_eq!(buf, b"hello".to_vec());

    b.close();
    assert!(matches!(b.recv().await, Err(TransportErr::Closed)));
}

#[tokio::test]
async fn test_udp_group() {
    init_logger();
    let any: Member = "127.0.0.1:0".parse().unwrap();
    let mut transports = Vec::new();
    for _ in 0..3 {
        transports.push(Arc::new(UdpTransport::bind(&any, 128 * 1024).await.unwrap()));
    }
    let members = transports.iter().map(|t| t.local()).collect::<Vec<_>>();

    let mut groups = Vec::new();
    let mut delivered = Vec::new();
    for t in transports {
        let d = Delivered::default();
        let ms = GroupMembership::new(members.clone(), t.local()).unwrap();
        groups.push(
            PaxosGroup::start(ms, t, Box::new(Collector(d.clone())), fast_config())
                .await
                .unwrap(),
        );
        delivered.push(d);
    }

    tokio::time::timeout(Duration::from_secs(10), groups[0].broadcast(b"over udp".to_vec()))
        .await
        .expect("broadcast stuck")
        .unwrap();
    wait_delivered(&delivered, &[0, 1, 2], 1).await;
    for g in groups.iter() {
        g.close().await;
    }
}
