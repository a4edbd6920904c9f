//! RepRapFirmware HTTP 接口（rr_connect / rr_filelist / rr_download）

use super::{Entry, EntryKind, FileManager, Listing};
use crate::error::SyncError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// RRF 时间戳格式（无时区，按本地时间解释）
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 建立连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

const TYPE_DIRECTORY: &str = "d";

/// rr_connect 等接口的通用响应
#[derive(Debug, Deserialize)]
struct ErrResponse {
    err: i64,
}

/// rr_filelist 的一页
#[derive(Debug, Deserialize)]
struct FileListPage {
    #[serde(default)]
    dir: String,
    #[serde(default)]
    files: Option<Vec<RawEntry>>,
    #[serde(default)]
    next: u64,
    #[serde(default)]
    err: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    typ: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    date: Option<String>,
}

pub struct RrfFileManager {
    client: reqwest::Client,
    base_url: String,
}

impl RrfFileManager {
    pub fn new(domain: &str, port: u16) -> Result<Self, SyncError> {
        let base_url = format!("http://{}:{}", domain, port);
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|source| SyncError::Http {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self { client, base_url })
    }

    /// 执行 GET 请求，返回响应内容和耗时（包含建立连接的时间）
    async fn get(&self, path_and_query: &str) -> Result<(Bytes, Duration), SyncError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let start = Instant::now();

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SyncError::Http {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status { url, status });
        }

        let body = resp.bytes().await.map_err(|source| SyncError::Http {
            url: url.clone(),
            source,
        })?;

        Ok((body, start.elapsed()))
    }

    async fn fetch_page(&self, dir: &str, first: u64) -> Result<FileListPage, SyncError> {
        let path = format!(
            "/rr_filelist?dir={}&first={}",
            urlencoding::encode(dir),
            first
        );
        let (body, _) = self.get(&path).await?;
        parse_page(&body).map_err(|reason| SyncError::Malformed {
            url: format!("{}{}", self.base_url, path),
            reason,
        })
    }
}

#[async_trait]
impl FileManager for RrfFileManager {
    async fn connect(&self, password: &str) -> Result<(), SyncError> {
        let now = Local::now().format(TIME_FORMAT).to_string();
        let path = format!(
            "/rr_connect?password={}&time={}",
            urlencoding::encode(password),
            urlencoding::encode(&now)
        );
        let (body, _) = self.get(&path).await?;

        let resp: ErrResponse =
            serde_json::from_slice(&body).map_err(|e| SyncError::Malformed {
                url: format!("{}/rr_connect", self.base_url),
                reason: e.to_string(),
            })?;

        match resp.err {
            0 => Ok(()),
            code => Err(SyncError::Rejected {
                action: "connect".to_string(),
                code,
            }),
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Listing, SyncError> {
        let mut entries = Vec::new();
        let mut first = 0;

        loop {
            let page = self.fetch_page(path, first).await?;

            if let Some(code) = page.err {
                return Err(SyncError::Rejected {
                    action: format!("listing {}", path),
                    code,
                });
            }

            let raw = page.files.unwrap_or_default();
            debug!("{} 第 {} 项起: {} 个条目", page.dir, first, raw.len());
            for item in raw {
                entries.push(into_entry(item).map_err(|reason| SyncError::Malformed {
                    url: format!("{}/rr_filelist?dir={}", self.base_url, path),
                    reason,
                })?);
            }

            // next 为 0 表示没有更多；不前进的 next 视为结束
            if page.next == 0 {
                break;
            }
            if page.next <= first {
                warn!("{} 的分页游标未前进 ({} -> {})，停止分页", path, first, page.next);
                break;
            }
            first = page.next;
        }

        Ok(Listing::new(path, entries))
    }

    async fn fetch_file(&self, path: &str) -> Result<(Bytes, Duration), SyncError> {
        self.get(&format!("/rr_download?name={}", urlencoding::encode(path)))
            .await
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

fn parse_page(body: &[u8]) -> Result<FileListPage, String> {
    let page: FileListPage = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    if page.err.is_none() && page.files.is_none() {
        return Err("neither files nor err present".to_string());
    }
    Ok(page)
}

fn into_entry(raw: RawEntry) -> Result<Entry, String> {
    let modified_at = match raw.date.as_deref() {
        Some(s) => parse_timestamp(s)?,
        None => DateTime::<Local>::from(std::time::UNIX_EPOCH),
    };
    let kind = if raw.typ == TYPE_DIRECTORY {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Ok(Entry {
        kind,
        name: raw.name,
        size: raw.size,
        modified_at,
    })
}

/// 解析 RRF 时间戳；夏令时重叠时取较早的时刻，跳变缺口按 UTC 解释
pub fn parse_timestamp(s: &str) -> Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|e| format!("bad timestamp {:?}: {}", s, e))?;
    Ok(Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_timestamp() {
        let t = parse_timestamp("2019-03-08T14:05:09").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2019, 3, 8));
        assert_eq!((t.hour(), t.minute(), t.second()), (14, 5, 9));

        assert!(parse_timestamp("08.03.2019 14:05").is_err());
    }

    #[test]
    fn test_parse_page() {
        let body = br#"{"dir":"0:/sys","first":0,"files":[
            {"type":"f","name":"config.g","size":1234,"date":"2019-03-08T14:05:09"},
            {"type":"d","name":"macros","size":0,"date":"2019-01-01T00:00:00"}
        ],"next":0}"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.dir, "0:/sys");
        assert_eq!(page.next, 0);

        let entries: Vec<Entry> = page
            .files
            .unwrap()
            .into_iter()
            .map(|r| into_entry(r).unwrap())
            .collect();
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 1234);
        assert!(entries[1].is_dir());
    }

    #[test]
    fn test_parse_page_err() {
        let page = parse_page(br#"{"err":2}"#).unwrap();
        assert_eq!(page.err, Some(2));

        assert!(parse_page(br#"{"dir":"0:/sys"}"#).is_err());
        assert!(parse_page(b"<html>").is_err());
    }

    #[test]
    fn test_missing_date_is_epoch() {
        let entry = into_entry(RawEntry {
            typ: "f".to_string(),
            name: "a".to_string(),
            size: 0,
            date: None,
        })
        .unwrap();
        assert_eq!(entry.modified_at.timestamp(), 0);
    }

    /// 本地 HTTP 服务，按顺序为每个连接返回一个 JSON 响应，并记录请求行
    async fn serve(bodies: Vec<&'static str>) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for body in bodies {
                let (mut sock, _) = listener.accept().await.unwrap();

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf);
                let line = request.lines().next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(line);

                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
                let _ = sock.shutdown().await;
            }
        });

        (port, requests)
    }

    fn requested_first(requests: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|line| {
                let start = line.find("first=")? + "first=".len();
                let rest = &line[start..];
                let end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                Some(rest[..end].to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_dir_merges_pages() {
        let (port, requests) = serve(vec![
            r#"{"dir":"0:/sys","first":0,"files":[{"type":"f","name":"b","size":1,"date":"2019-03-08T14:05:09"}],"next":1}"#,
            r#"{"dir":"0:/sys","first":1,"files":[{"type":"d","name":"a","size":0,"date":"2019-03-08T14:05:09"}],"next":0}"#,
        ])
        .await;
        let rfm = RrfFileManager::new("127.0.0.1", port).unwrap();

        let listing = rfm.list_dir("0:/sys").await.unwrap();

        let names: Vec<_> = listing
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.kind))
            .collect();
        assert_eq!(
            names,
            vec![("a", EntryKind::Directory), ("b", EntryKind::File)]
        );
        assert_eq!(listing.dir, "0:/sys");
        assert_eq!(requested_first(&requests), vec!["0", "1"]);
        assert!(requests.lock().unwrap()[0].starts_with("GET /rr_filelist?dir=0%3A%2Fsys"));
    }

    #[tokio::test]
    async fn test_list_dir_stops_when_cursor_does_not_advance() {
        let (port, requests) = serve(vec![
            r#"{"dir":"0:/sys","first":0,"files":[{"type":"f","name":"a.g","size":1,"date":"2019-03-08T14:05:09"}],"next":2}"#,
            r#"{"dir":"0:/sys","first":2,"files":[{"type":"f","name":"b.g","size":1,"date":"2019-03-08T14:05:09"}],"next":1}"#,
        ])
        .await;
        let rfm = RrfFileManager::new("127.0.0.1", port).unwrap();

        let listing = rfm.list_dir("0:/sys").await.unwrap();

        assert_eq!(listing.entries.len(), 2);
        assert_eq!(requested_first(&requests), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn test_list_dir_err_is_rejected() {
        let (port, _) = serve(vec![r#"{"err":2}"#]).await;
        let rfm = RrfFileManager::new("127.0.0.1", port).unwrap();

        let err = rfm.list_dir("0:/missing").await.unwrap_err();

        assert!(matches!(err, SyncError::Rejected { code: 2, .. }));
    }

    #[tokio::test]
    async fn test_connect() {
        let (port, requests) = serve(vec![r#"{"err":0}"#, r#"{"err":1}"#]).await;
        let rfm = RrfFileManager::new("127.0.0.1", port).unwrap();

        rfm.connect("reprap").await.unwrap();
        let err = rfm.connect("wrong").await.unwrap_err();

        assert!(matches!(err, SyncError::Rejected { code: 1, ref action } if action == "connect"));
        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("GET /rr_connect?password=reprap&time="));
        assert!(requests[1].starts_with("GET /rr_connect?password=wrong&time="));
    }
}
