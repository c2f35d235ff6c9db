use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};

fn rankmon_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rankmon"))
}

async fn rankmon(args: &[&str]) -> Output {
    tokio::process::Command::new(rankmon_bin())
        .args(args)
        .env_remove("RANKMON_CONFIG")
        .env_remove("RANKMON_ACCESS_TOKEN")
        .output()
        .await
        .expect("rankmon binary should run")
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

#[tokio::test]
async fn help_lists_every_command() {
    let out = rankmon(&["help"]).await;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for command in ["run", "once", "check", "doctor"] {
        assert!(stdout.contains(command), "help is missing {}: {}", command, stdout);
    }
}

#[tokio::test]
async fn unknown_command_exits_non_zero() {
    let out = rankmon(&["serve"]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unknown command: serve"));
}

#[tokio::test]
async fn check_reports_every_missing_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.json",
        r#"{ "rank_monitored_searches": [{ "url": "example.com" }] }"#,
    );

    let out = rankmon(&["check", "--config", config.to_str().unwrap()]).await;

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains(
            "store_info, max_search_rank, rank_monitored_searches[0].search_words is undefined."
        ),
        "{}",
        stderr
    );
}

#[tokio::test]
async fn check_accepts_toml_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "rankmon.toml",
        r#"
max_search_rank = 30
schedule = "0 30 6 * * *"
timezone = "Asia/Tokyo"

[store_info]
file_id = "sheet-1"

[[rank_monitored_searches]]
url = "example.com"
search_words = ["alpha", "beta"]
"#,
    );

    let out = rankmon(&["check", "--config", config.to_str().unwrap()]).await;

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sheet-1"), "{}", stdout);
    assert!(stdout.contains("Asia/Tokyo"), "{}", stdout);
    assert!(stdout.contains("example.com"), "{}", stdout);
}

#[cfg(unix)]
mod end_to_end {
    use super::*;
    use axum::Router;
    use axum::http::{Method, StatusCode, Uri};
    use std::os::unix::fs::PermissionsExt;

    type Log = Arc<Mutex<Vec<(String, String)>>>;

    async fn spawn_mock_sheets() -> (String, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let recorder = log.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let app = Router::new().fallback(move |method: Method, uri: Uri, body: String| {
            let recorder = recorder.clone();
            async move {
                let target = uri.to_string();
                recorder
                    .lock()
                    .unwrap()
                    .push((format!("{} {}", method, target), body));
                if method == Method::POST {
                    return (StatusCode::OK, "{}".to_string());
                }
                if target.contains("includeGridData=true") {
                    let grid = serde_json::json!({ "sheets": [{ "data": [{ "rowData": [
                        { "values": [{ "formattedValue": "Date" }] },
                        { "values": [{
                            "formattedValue": "2024/03/06",
                            "userEnteredFormat": { "numberFormat": { "pattern": "yyyy/mm/dd" } }
                        }] },
                        { "values": [{
                            "formattedValue": "2024/03/07",
                            "userEnteredFormat": { "numberFormat": { "pattern": "yyyy/mm/dd" } }
                        }] }
                    ] }] }] });
                    return (StatusCode::OK, grid.to_string());
                }
                let meta = serde_json::json!({ "sheets": [
                    { "properties": { "sheetId": 0, "title": "Ranks", "index": 0 } }
                ] });
                (StatusCode::OK, meta.to_string())
            }
        });
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://127.0.0.1:{}", port), log)
    }

    fn fake_googler(dir: &Path) -> PathBuf {
        // The keyword is the last argument.
        let path = write(
            dir,
            "googler",
            r#"#!/bin/sh
for arg; do kw="$arg"; done
case "$kw" in
  alpha) echo '[{"url":"https://other.net"},{"url":"https://example.com/page"}]' ;;
  beta) echo '[{"url":"https://other.net"}]' ;;
  *) echo 'blocked' >&2; exit 1 ;;
esac
"#,
        );
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn config(dir: &Path, api_base: &str) -> PathBuf {
        let credentials = write(dir, "credentials.json", r#"{"access_token":"tok"}"#);
        let googler = fake_googler(dir);
        let content = serde_json::json!({
            "max_search_rank": 10,
            "rank_monitored_searches": [
                { "url": "example.com/page", "search_words": ["alpha", "beta", "gamma"] }
            ],
            "store_info": {
                "file_id": "sheet-1",
                "api_base": api_base,
                "credentials_path": credentials,
            },
            "search": { "command": googler, "courtesy_delay_secs": 0 }
        });
        write(dir, "config.json", &content.to_string())
    }

    #[tokio::test]
    async fn once_records_ranks_into_the_dated_row() {
        let (base, log) = spawn_mock_sheets().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &base);

        let out = rankmon(&[
            "once",
            "--config",
            config.to_str().unwrap(),
            "--at",
            "2024-03-07",
        ])
        .await;

        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(out.status.success(), "{}", stdout);
        assert!(stdout.contains("alpha: rank:2"), "{}", stdout);
        assert!(stdout.contains("beta: rank:11"), "{}", stdout);
        assert!(stdout.contains("gamma: rank:-1"), "{}", stdout);

        let log = log.lock().unwrap();
        let posts: Vec<_> = log.iter().filter(|(req, _)| req.starts_with("POST")).collect();
        assert_eq!(posts.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&posts[0].1).unwrap();
        let data = body["data"].as_array().unwrap();
        let cells: Vec<(String, i64)> = data
            .iter()
            .map(|d| {
                (
                    d["range"].as_str().unwrap().to_string(),
                    d["values"][0][0].as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            cells,
            vec![
                ("'Ranks'!B3".to_string(), 2),
                ("'Ranks'!C3".to_string(), 11),
                ("'Ranks'!D3".to_string(), -1),
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_never_contacts_the_store() {
        let (base, log) = spawn_mock_sheets().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &base);

        let out = rankmon(&["once", "--dry-run", "--config", config.to_str().unwrap()]).await;

        assert!(out.status.success());
        assert!(String::from_utf8_lossy(&out.stdout).contains("alpha: rank:2"));
        assert!(log.lock().unwrap().is_empty());
    }
}
