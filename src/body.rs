// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 压缩请求体的限时读取。
//!
//! 解压在 `thread::scope` 内的单独线程中进行，每次 `read` 把请求的字节数发给该线程并等待结果，
//! 最多等待 `len` 毫秒再加 600 毫秒。超时视为正常的流结束。作用域结束时解压线程一定已经退出。

use std::io::{self, Cursor, Read};
use std::thread::{self, Scope};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use flate2::read::{DeflateDecoder, GzDecoder};
use log::{debug, warn};

use crate::{exception::Exception, param::HttpEncoding};

const GRACE_MS: u64 = 600;

pub struct TimedGzipReader {
    requests: Option<Sender<usize>>,
    chunks: Receiver<io::Result<Vec<u8>>>,
    finished: bool,
}

impl TimedGzipReader {
    /// 在 `scope` 中启动解压线程，读取器须在作用域结束前被丢弃
    pub fn new<'scope, 'env, R>(
        scope: &'scope Scope<'scope, 'env>,
        input: R,
        encoding: HttpEncoding,
    ) -> Self
    where
        R: Read + Send + 'scope,
    {
        let decoder: Box<dyn Read + Send + 'scope> = match encoding {
            HttpEncoding::Gzip => Box::new(GzDecoder::new(input)),
            HttpEncoding::Deflate => Box::new(DeflateDecoder::new(input)),
        };
        Self::spawn(scope, decoder)
    }

    fn spawn<'scope, 'env>(
        scope: &'scope Scope<'scope, 'env>,
        mut decoder: Box<dyn Read + Send + 'scope>,
    ) -> Self {
        let (req_tx, req_rx) = bounded::<usize>(1);
        let (chunk_tx, chunk_rx) = bounded::<io::Result<Vec<u8>>>(1);
        scope.spawn(move || {
            for len in req_rx {
                let mut buf = vec![0u8; len];
                let result = decoder.read(&mut buf).map(|n| {
                    buf.truncate(n);
                    buf
                });
                let done = matches!(&result, Ok(b) if b.is_empty()) || result.is_err();
                if chunk_tx.send(result).is_err() || done {
                    break;
                }
            }
        });
        Self {
            requests: Some(req_tx),
            chunks: chunk_rx,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        // 关闭请求通道，解压线程读完手上这一块后退出
        self.requests = None;
    }
}

impl Read for TimedGzipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let sent = match &self.requests {
            Some(tx) => tx.send(buf.len()).is_ok(),
            None => false,
        };
        if !sent {
            self.finish();
            return Ok(0);
        }
        let wait = Duration::from_millis(buf.len() as u64 + GRACE_MS);
        match self.chunks.recv_timeout(wait) {
            Ok(Ok(chunk)) => {
                if chunk.is_empty() {
                    self.finish();
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Ok(Err(e)) => {
                self.finish();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("解压请求体超过{}毫秒，按流结束处理", wait.as_millis());
                self.finish();
                Ok(0)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.finish();
                Ok(0)
            }
        }
    }
}

/// 按 `Content-Encoding` 解码请求体；未压缩时原样返回。
///
/// 解码后的长度超过 `limit` 时立即停止解压并返回 `UploadTooLarge`。
pub fn decode_body(
    body: &[u8],
    encoding: Option<HttpEncoding>,
    limit: u64,
) -> Result<Vec<u8>, Exception> {
    let encoding = match encoding {
        Some(e) => e,
        None if body.len() as u64 > limit => {
            return Err(Exception::UploadTooLarge(body.len() as u64))
        }
        None => return Ok(body.to_vec()),
    };
    let decoded = thread::scope(|scope| -> io::Result<Vec<u8>> {
        let reader = TimedGzipReader::new(scope, Cursor::new(body), encoding);
        let mut decoded = Vec::with_capacity(body.len() * 2);
        reader.take(limit.saturating_add(1)).read_to_end(&mut decoded)?;
        Ok(decoded)
    })?;
    if decoded.len() as u64 > limit {
        warn!("请求体解压后超过{}字节的上限，已中止", limit);
        return Err(Exception::UploadTooLarge(decoded.len() as u64));
    }
    debug!("请求体解压：{}字节 -> {}字节", body.len(), decoded.len());
    Ok(decoded)
}
