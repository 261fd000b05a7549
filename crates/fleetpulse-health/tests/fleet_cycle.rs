//! End-to-end check cycles: real HTTP probes against local TCP servers,
//! results committed to an in-memory state store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use fleetpulse_health::{
    CheckerConfig, CycleRunner, DeviceChecker, HealthScheduler, HttpProbe,
};
use fleetpulse_state::{Device, DeviceStatus, StateStore};

/// Serve a health endpoint; `status_for(n)` picks the status line for the
/// n-th connection.
async fn serve(status_for: fn(usize) -> &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let served = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let n = served.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_for(n)
                );
                let _ = socket.write_all(resp.as_bytes()).await;
            });
        }
    });
    port
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn device(id: &str, port: u16) -> Device {
    Device {
        id: id.to_string(),
        name: format!("{id} sensor"),
        ip: "127.0.0.1".to_string(),
        port,
        status: DeviceStatus::Offline,
        owner_id: 7,
        created_at: 1_700_000_000,
    }
}

async fn seeded_fleet() -> StateStore {
    let healthy = serve(|_| "200 OK").await;
    let flapping = serve(|n| if n % 2 == 0 { "200 OK" } else { "503 Service Unavailable" }).await;
    let down = closed_port().await;

    let store = StateStore::open_in_memory().unwrap();
    store.put_device(&device("a", healthy)).unwrap();
    store.put_device(&device("b", flapping)).unwrap();
    store.put_device(&device("c", down)).unwrap();
    store
}

fn http_runner(store: StateStore) -> CycleRunner<StateStore, HttpProbe> {
    let config = CheckerConfig {
        timeout: Duration::from_secs(2),
        max_attempts: 4,
    };
    CycleRunner::new(store, DeviceChecker::new(Arc::new(HttpProbe::default()), config))
}

#[tokio::test]
async fn http_cycle_marks_fleet_and_records_history() {
    let store = seeded_fleet().await;
    let report = http_runner(store.clone()).run_cycle().await.unwrap();

    assert_eq!(report.cycle, 1);
    assert_eq!((report.online, report.offline), (2, 1));

    let a = store.latest_status_check("a").unwrap().unwrap();
    assert!(a.check.is_online);
    assert_eq!(a.check.success_count, 4);
    assert!(a.check.response_time.is_some());
    assert_eq!(a.check.error_message, None);

    let b = store.latest_status_check("b").unwrap().unwrap();
    assert!(b.check.is_online);
    assert_eq!(b.check.success_count, 2);
    assert!(b.check.response_time.is_some());
    assert_eq!(b.check.error_message, None);

    let c = store.latest_status_check("c").unwrap().unwrap();
    assert!(!c.check.is_online);
    assert_eq!(c.check.success_count, 0);
    assert_eq!(c.check.total_attempts, 4);
    assert_eq!(c.check.response_time, None);
    assert_eq!(c.check.error_message.as_deref(), Some("ConnectionRefused"));

    assert_eq!(store.get_device("a").unwrap().unwrap().status, DeviceStatus::Online);
    assert_eq!(store.get_device("b").unwrap().unwrap().status, DeviceStatus::Online);
    assert_eq!(store.get_device("c").unwrap().unwrap().status, DeviceStatus::Offline);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_runner_commits_successive_cycles() {
    let store = seeded_fleet().await;
    let runner = Arc::new(http_runner(store.clone()));
    let scheduler = HealthScheduler::new();
    scheduler
        .arm("device_health_check", Duration::from_millis(100), runner.into_job())
        .await
        .unwrap();

    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        while store.last_cycle().unwrap() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    scheduler.shutdown().await;
    assert!(reached.is_ok(), "scheduler never completed two cycles");

    let history = store.list_status_checks("c", 10).unwrap();
    assert!(history.len() >= 2);
    // Newest first.
    assert!(history[0].cycle > history[1].cycle);
    assert!(history.iter().all(|r| !r.check.is_online));
}
