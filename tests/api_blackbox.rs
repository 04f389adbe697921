use std::{
    net::TcpListener as StdTcpListener,
    process::{Child, Command, Stdio},
    time::Duration,
};

use tempfile::TempDir;

fn pick_free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

fn base_command(tmp: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_menu2img"));
    cmd.env("MENU2IMG_UPLOAD_DIR", tmp.path().join("uploads"))
        .env("MENU2IMG_OUTPUT_DIR", tmp.path().join("dishes"))
        .env("MENU2IMG_HISTORY_FILE", tmp.path().join("history.json"))
        .env("MENU2IMG_LOG_FILE", tmp.path().join("test.log"))
        .env("MENU2IMG_API_URL", "http://127.0.0.1:9/v1")
        .env_remove("OPENAI_API_KEY") // never reach a real model from tests
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

struct TestServer {
    tmp: TempDir,
    port: u16,
    child: Child,
}

impl TestServer {
    fn start() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let port = pick_free_port();

        let child = base_command(&tmp)
            .env("MENU2IMG_BIND_ADDR", format!("127.0.0.1:{port}"))
            .spawn()
            .expect("spawn menu2img");

        Self { tmp, port, child }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn wait_ready(base: &str) {
    let client = reqwest::Client::new();
    let mut waited = Duration::from_millis(0);

    loop {
        match client.get(format!("{base}/healthz")).send().await {
            Ok(resp) if resp.status().is_success() => return,
            _ => {}
        }

        assert!(
            waited < Duration::from_secs(5),
            "server did not become ready (healthz)"
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
}

fn multipart_body(filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "blackbox-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[tokio::test]
async fn healthz_ok() {
    let srv = TestServer::start();
    let base = srv.base_url();
    wait_ready(&base).await;

    let text = reqwest::get(format!("{base}/healthz"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(
        text.contains("ok"),
        "expected healthz to contain ok, got: {text}"
    );
}

#[tokio::test]
async fn upload_without_key_reports_configuration_error() {
    let srv = TestServer::start();
    let base = srv.base_url();
    wait_ready(&base).await;

    let (ct, body) = multipart_body("lunch menu.jpg", b"not really a jpeg");
    let resp = reqwest::Client::new()
        .post(format!("{base}/upload"))
        .header(reqwest::header::CONTENT_TYPE, ct)
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 503);
    assert!(resp.headers().contains_key("x-request-id"));
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(
        json["error"].as_str().unwrap_or_default().contains("not configured"),
        "{json}"
    );

    // The upload itself is kept and served back.
    let resp = reqwest::get(format!("{base}/upload/lunch_menu.jpg"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"not really a jpeg");
    assert!(srv.tmp.path().join("uploads/lunch_menu.jpg").is_file());
}

#[tokio::test]
async fn unknown_image_is_404() {
    let srv = TestServer::start();
    let base = srv.base_url();
    wait_ready(&base).await;

    let resp = reqwest::get(format!("{base}/image/nothing_here.png"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[test]
fn process_command_fails_without_key() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let menu = tmp.path().join("menu.jpg");
    std::fs::write(&menu, b"menu bytes").unwrap();

    let status = base_command(&tmp)
        .arg("process")
        .arg(&menu)
        .status()
        .expect("run menu2img process");
    assert!(!status.success());
    assert!(!tmp.path().join("history.json").exists());
}

#[test]
fn process_command_fails_on_missing_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let status = base_command(&tmp)
        .arg("process")
        .arg(tmp.path().join("nope.jpg"))
        .status()
        .expect("run menu2img process");
    assert!(!status.success());
}
