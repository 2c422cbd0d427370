//! End-to-end transfers against an in-memory emulation of the device's
//! LittleFS COM module.

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use pico_com_link::transfer::{Failure, TransferState, UploadSession};
use pico_com_link::{Error, Link, Transport};

const CHUNK: usize = 128;

#[derive(Default)]
struct WriteState {
    path: String,
    total: u32,
    next: u32,
}

/// Minimal device model: a path-to-bytes map plus the same one-transfer
/// state the firmware keeps.
#[derive(Default)]
struct FakeDevice {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    write: Option<WriteState>,
    /// Refuse the write data frame with this index once, then recover.
    fail_write_at: Option<u32>,
}

impl FakeDevice {
    fn ok(echo: &str) -> String {
        format!("A:{}#OK-#", echo)
    }

    fn err(echo: &str, msg: &str) -> String {
        format!("A:{}#Error: {}#", echo, msg)
    }

    fn handle(&mut self, frame: &str) -> String {
        let body = frame
            .strip_prefix("S:")
            .and_then(|f| f.strip_suffix('#'))
            .expect("command frame shape");

        let (head, arg) = match body.find(",\"") {
            Some(at) => (&body[..at], Some(&body[at + 2..body.len() - 1])),
            None => (body, None),
        };
        let parts: Vec<&str> = head.split(',').collect();
        let module = parts[0];
        let operation = parts[1];
        let fields: Vec<u32> = parts[2..]
            .iter()
            .map(|p| {
                let p = p.strip_prefix("0x").unwrap_or(p);
                u32::from_str_radix(p, 16).expect("numeric field")
            })
            .collect();

        assert_eq!(module, "F0", "only the file module is emulated");
        match operation {
            "FILE list" => self.list(),
            "FILE write" => self.write(&fields, arg),
            "FILE read" => self.read(&fields, arg),
            "FILE delete" => self.delete(arg.expect("path")),
            "FILE mkdir" => self.mkdir(arg.expect("path")),
            "FILE rmdir" => self.rmdir(arg.expect("path")),
            other => panic!("unexpected operation {}", other),
        }
    }

    fn list(&self) -> String {
        let mut out = String::from("A:F0,FILE list#OK-directory of LittleFS:\n");
        for dir in &self.dirs {
            out.push_str(dir);
            out.push('\n');
        }
        for (path, data) in &self.files {
            out.push_str(&format!("{}*{}\n", path, data.len()));
        }
        out.push('#');
        out
    }

    fn write(&mut self, fields: &[u32], arg: Option<&str>) -> String {
        let echo = format!(
            "F0,FILE write,0x{:x},0x{:x},0x{:x},0x{:x}",
            fields[0], fields[1], fields[2], fields[3]
        );
        match fields[0] {
            0x0 => {
                let path = arg.expect("destination path").to_string();
                self.files.insert(path.clone(), Vec::new());
                self.write = Some(WriteState {
                    path,
                    total: fields[2],
                    next: 1,
                });
                Self::ok(&echo)
            }
            0xd => {
                let state = match self.write.as_mut() {
                    Some(state) => state,
                    None => return Self::err(&echo, "No active file write sequence."),
                };
                if fields[1] != state.next {
                    return Self::err(&echo, "Invalid chunk order.");
                }
                if self.fail_write_at == Some(fields[1]) {
                    self.fail_write_at = None;
                    return Self::err(&echo, "injected flash failure");
                }
                let bytes = BASE64.decode(arg.expect("chunk payload")).expect("base64");
                self.files
                    .get_mut(&state.path)
                    .expect("init created the file")
                    .extend_from_slice(&bytes);
                if state.next == state.total {
                    self.write = None;
                } else {
                    state.next += 1;
                }
                Self::ok(&echo)
            }
            other => Self::err(&echo, &format!("Invalid sequence id P1:{:x}", other)),
        }
    }

    fn read(&mut self, fields: &[u32], arg: Option<&str>) -> String {
        let path = arg.expect("source path");
        let data = match self.files.get(path) {
            Some(data) => data.clone(),
            None => {
                let echo = format!(
                    "F0,FILE read,0x{:x},0x{:x},0x{:x},0x{:x}",
                    fields[0], fields[1], fields[2], fields[3]
                );
                return Self::err(&echo, &format!("File not found: {}", path));
            }
        };
        let total = ((data.len() + CHUNK - 1) / CHUNK) as u32;
        let size = data.len() as u32;

        match fields[0] {
            0x0 => Self::ok(&format!(
                "F0,FILE read,0x0,0x0,0x{:x},0x{:x},\"{}\"",
                total, size, path
            )),
            0xd => {
                let index = fields[1];
                assert!(index >= 1 && index <= total, "client chunk out of range");
                let lo = (index as usize - 1) * CHUNK;
                let hi = (lo + CHUNK).min(data.len());
                Self::ok(&format!(
                    "F0,FILE read,0xd,0x{:x},0x{:x},0x{:x},\"{}\"",
                    index,
                    total,
                    size,
                    BASE64.encode(&data[lo..hi])
                ))
            }
            other => panic!("unexpected read flag {:x}", other),
        }
    }

    fn delete(&mut self, path: &str) -> String {
        let echo = "F0,FILE delete,0,0,0,0";
        if self.files.remove(path).is_some() {
            Self::ok(echo)
        } else {
            Self::err(echo, "File does not exist.")
        }
    }

    fn mkdir(&mut self, path: &str) -> String {
        let dir = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };
        self.dirs.insert(dir);
        Self::ok("F0,FILE mkdir,0,0,0,0")
    }

    fn rmdir(&mut self, path: &str) -> String {
        let echo = "F0,FILE rmdir,0,0,0,0";
        if self.dirs.remove(path) {
            self.files.retain(|p, _| !p.starts_with(path));
            Self::ok(echo)
        } else {
            Self::err(echo, "Path does not exist.")
        }
    }
}

impl Transport for FakeDevice {
    type Error = String;

    fn send(&mut self, frame: &str) -> Result<String, Self::Error> {
        Ok(self.handle(frame))
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn upload_download_round_trip_over_chunk_boundaries() {
    let mut link = Link::new(FakeDevice::default());

    for &len in &[0usize, 1, 127, 128, 129, 1000] {
        let data = pattern(len);
        let path = format!("/rt-{}.bin", len);

        link.upload(&path, data.clone(), |_, _| {}).unwrap();
        let fetched = link.download(&path, |_, _| {}).unwrap();

        assert_eq!(fetched, data, "length {}", len);
    }
}

#[test]
fn listing_reflects_uploads_with_sizes() {
    let mut link = Link::new(FakeDevice::default());

    link.make_dir("/logs").unwrap();
    link.upload("/logs/a.txt", pattern(300), |_, _| {}).unwrap();

    let entries = link.list_tree().unwrap();
    let file = entries.iter().find(|e| e.path == "/logs/a.txt").unwrap();
    assert_eq!(file.size, Some(300));
    assert!(entries.iter().any(|e| e.path == "/logs/" && e.is_dir()));
}

#[test]
fn delete_and_rmdir_remove_their_targets() {
    let mut link = Link::new(FakeDevice::default());

    link.make_dir("/tmp").unwrap();
    link.upload("/tmp/x.bin", pattern(5), |_, _| {}).unwrap();

    link.remove_file("/tmp/x.bin").unwrap();
    assert!(matches!(
        link.download("/tmp/x.bin", |_, _| {}),
        Err(Error::NotOk(_))
    ));

    link.remove_dir("/tmp/").unwrap();
    let entries = link.list_tree().unwrap();
    assert_eq!(entries.len(), 1); // just the root
}

#[test]
fn retried_upload_after_mid_transfer_failure_matches_one_shot_result() {
    let data = pattern(5 * 128 + 17);

    // clean one-shot upload as the reference
    let mut clean = Link::new(FakeDevice::default());
    clean.upload("/f.bin", data.clone(), |_, _| {}).unwrap();
    let reference = clean.download("/f.bin", |_, _| {}).unwrap();

    // first attempt dies at chunk 3, the retry starts over from chunk 1
    let mut device = FakeDevice::default();
    device.fail_write_at = Some(3);
    let mut link = Link::new(device);

    let mut session = UploadSession::new("/f.bin", data.clone());
    let err = session.run(&mut link, |_, _| {}).unwrap_err();
    assert!(matches!(err, Error::NotOk(_)));
    assert_eq!(session.state(), TransferState::Failed(Failure::Chunk(3)));

    link.upload("/f.bin", data, |_, _| {}).unwrap();
    assert_eq!(link.download("/f.bin", |_, _| {}).unwrap(), reference);
}
