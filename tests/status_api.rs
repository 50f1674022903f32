use chrono::{Local, Utc};
use netwatch::config::PrimaryTarget;
use netwatch::{Classification, CycleState, DowntimeInterval, Presenter, StatusBoard, api};
use tokio::net::TcpListener;

async fn spawn_api(board: StatusBoard) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(api::serve(listener, board));
    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn status_is_unavailable_until_the_first_cycle() {
    let mut board = StatusBoard::new();
    let base = spawn_api(board.clone()).await;
    let http = client();

    let resp = http.get(format!("{}/api/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let start = Utc::now() - chrono::TimeDelta::seconds(4);
    let state = CycleState {
        timestamp: Local::now(),
        cycle: 7,
        primary: PrimaryTarget::default(),
        checks: None,
        classification: Classification::Healthy,
        summary: Classification::Healthy.label("api.openai.com"),
        uptime_seconds: 14,
        downtime_seconds: 4,
        error: None,
        closed_downtime: Some(DowntimeInterval {
            start,
            end: start + chrono::TimeDelta::seconds(4),
            duration_seconds: 4.0,
        }),
    };
    board.present(&state, &state.summary);

    let resp = http.get(format!("{}/api/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["cycle"], 7);
    assert_eq!(body["classification"], "healthy");
    assert_eq!(body["downtime_seconds"], 4);
    assert_eq!(body["primary"]["host"], "api.openai.com");

    let resp = http.get(format!("{}/api/downtime", base)).send().await.unwrap();
    let intervals: Vec<DowntimeInterval> = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].duration_seconds, 4.0);
}
