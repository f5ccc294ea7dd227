// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # htserve 服务端
//!
//! 基于 Tokio 运行时接收连接，每个连接交给阻塞线程池处理：
//! - 读取并解析请求头与请求体
//! - 交给 [`Engine`] 分发，得到响应后分块写回
//! - 后台任务定期检查内存，吃紧时清空处理器缓存
//! - 后台管理控制台（CLI 指令交互）

use htserve::{
    config::Config,
    dispatch::Engine,
    exception::Exception,
    handler::HandlerRegistry,
    handlers,
    memory::{MemoryControl, ProcessMemory},
    param::SERVER_NAME,
    request::RequestContext,
    response::Response,
    state::{LocalhostAuthenticator, ServerState},
};

use log::{debug, error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
    sync::Notify,
};

use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// 内存检查间隔
const MEMORY_POLL_SECS: u64 = 10;
/// 单个连接的读超时
const READ_TIMEOUT_SECS: u64 = 30;

fn init_logging() {
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
            )))
            .build();
        let config = log4rs::config::Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));
        match config {
            Ok(config) => {
                if log4rs::init_config(config).is_ok() {
                    warn!("无法载入config/log4rs.yaml（{}），日志只输出到控制台", e);
                }
            }
            Err(e) => eprintln!("日志系统初始化失败：{}", e),
        }
    }
}

fn main() {
    init_logging();

    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return;
        }
    };
    runtime.block_on(run(config));
}

async fn run(config: Config) {
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);

    let mut registry = HandlerRegistry::new();
    handlers::register_all(&mut registry);
    info!("已注册{}个处理器", registry.len());

    let memory = MemoryControl::new(
        Box::new(ProcessMemory::new(config.memory_limit())),
        config.memory_min_free(),
    );
    let peer_name = format!("{}-{}", SERVER_NAME, port);
    let state = ServerState::new(&peer_name, Box::new(LocalhostAuthenticator));
    let engine = Arc::new(Engine::new(config, registry, memory, state));

    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("服务端在{}上监听Socket连接", socket);

    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));

    // 内存吃紧时清空处理器缓存
    tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(MEMORY_POLL_SECS));
            loop {
                interval.tick().await;
                if engine.memory().short_status() && !engine.cache().is_empty() {
                    info!("内存吃紧，清空处理器缓存（{}项）", engine.cache().len());
                    engine.cache().clear();
                }
            }
        }
    });

    tokio::spawn(admin_console(
        Arc::clone(&engine),
        Arc::clone(&shutdown),
        Arc::clone(&active_connection),
    ));

    let mut id: u128 = 0;
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let std_stream = match stream.into_std() {
            Ok(s) => s,
            Err(e) => {
                error!("[ID{}]无法转换TCPStream：{}", id, e);
                continue;
            }
        };
        let engine = Arc::clone(&engine);
        let active_connection = Arc::clone(&active_connection);
        active_connection.fetch_add(1, Ordering::SeqCst);
        tokio::task::spawn_blocking(move || {
            handle_connection(std_stream, addr, id, &engine);
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

async fn admin_console(
    engine: Arc<Engine>,
    shutdown: Arc<Notify>,
    active_connection: Arc<AtomicU32>,
) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                shutdown.notify_one();
                println!("停机指令已激活，服务器将停止接收新连接...");
                break;
            }
            "status" => {
                let state = engine.state();
                println!("== htserve 状态 ===");
                println!("版本: {}", state.version());
                println!("运行时长: {}分钟", state.uptime_minutes());
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!("缓存的处理器: {}", engine.cache().len());
                println!("处理器解析次数: {}", engine.cache().resolution_count());
                println!("可用内存: {}字节", engine.memory().available());
                println!("====================");
            }
            "gc" => {
                engine.cache().clear();
                println!("处理器缓存已清空");
            }
            "help" => {
                println!("== htserve Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("gc     - 清空处理器缓存");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

/// 从连接中读到空行为止，返回（请求头，已多读的请求体字节）
fn read_head(
    stream: &mut TcpStream,
    max_header_size: usize,
) -> Result<(Vec<u8>, Vec<u8>), Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buffer.split_off(end + 4);
            return Ok((buffer, rest));
        }
        if buffer.len() > max_header_size {
            return Err(Exception::HeaderTooLarge);
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn read_request(
    stream: &mut TcpStream,
    addr: SocketAddr,
    id: u128,
    config: &Config,
) -> Result<RequestContext, Exception> {
    let (head, mut body) = read_head(stream, config.max_header_size())?;
    let mut request = RequestContext::parse_head(&head, id)?;
    request.set_client(addr.to_string());

    if let Some(length) = request.content_length() {
        if length > config.max_upload_size() {
            return Err(Exception::UploadTooLarge(length));
        }
        let length = length as usize;
        if body.len() < length {
            let mut rest = vec![0u8; length - body.len()];
            stream.read_exact(&mut rest)?;
            body.extend_from_slice(&rest);
        }
        body.truncate(length);
        request.set_body(body);
    }
    Ok(request)
}

fn handle_connection(mut stream: TcpStream, addr: SocketAddr, id: u128, engine: &Engine) {
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS))))
    {
        error!("[ID{}]无法设置TCPStream：{}", id, e);
        return;
    }
    let start_time = Instant::now();

    let response = match read_request(&mut stream, addr, id, engine.config()) {
        Ok(request) => {
            debug!("[ID{}]成功解析HTTP请求：{}", id, request.path());
            engine.serve(&request)
        }
        Err(e) => {
            warn!("[ID{}]读取HTTP请求失败：{}", id, e);
            Response::from_exception(&e)
        }
    };
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    match response.write_to(&mut stream, engine.config().chunk_size()) {
        Ok(written) => debug!("[ID{}]响应发送完毕，响应体{}字节", id, written),
        Err(e) => warn!("[ID{}]发送响应失败：{}", id, e),
    }
    if let Err(e) = stream.flush() {
        debug!("[ID{}]刷新连接失败：{}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;
    use std::thread;
    use tempfile::TempDir;

    fn roundtrip(root: &TempDir, raw: &'static [u8]) -> String {
        let config = Config::from_toml_str(&format!(
            "www_root = '{}'\nmax_upload_size = 64",
            root.path().display()
        ))
        .unwrap();
        let engine = Engine::new(
            config,
            HandlerRegistry::new(),
            MemoryControl::new(Box::new(ProcessMemory::new(u64::MAX)), 0),
            ServerState::new("main-test", Box::new(LocalhostAuthenticator)),
        );
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(raw).unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });
        let (stream, peer) = listener.accept().unwrap();
        handle_connection(stream, peer, 0, &engine);
        client.join().unwrap()
    }

    #[test]
    fn test_connection_serves_file() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.txt"), "hello").unwrap();
        let response = roundtrip(&root, b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 5\r\n"));
        assert!(response.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn test_connection_rejects_declared_oversized_body() {
        let root = TempDir::new().unwrap();
        let response = roundtrip(
            &root,
            b"POST /a.html HTTP/1.1\r\nContent-Length: 100000\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 413"));
    }
}
