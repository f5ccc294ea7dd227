// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 内置处理器。
//!
//! - `status`：服务器运行状态，配合 `status.html` 模板使用；
//! - `echo`：把收到的参数逐行原样返回，便于调试表单与上传。

use std::io::Cursor;

use crate::{
    args::Arguments,
    handler::{HandlerOutput, HandlerRegistry, HandlerUnit},
    properties::Properties,
    request::RequestContext,
    state::{ServerState, SERVLETS_CALLED},
};

fn status(request: &RequestContext, _args: Option<&Arguments>, state: &ServerState) -> HandlerOutput {
    let mut props = Properties::new();
    props.put("peername", state.peer_name());
    props.put("started", state.started().format("%Y-%m-%d %H:%M:%S").to_string());
    props.put("called", state.get_config(SERVLETS_CALLED, ""));
    props.put("user", request.principal().unwrap_or_default());
    HandlerOutput::Properties(props)
}

fn echo(request: &RequestContext, args: Option<&Arguments>, _state: &ServerState) -> HandlerOutput {
    let mut text = format!("path={}\n", request.path());
    if let Some(args) = args {
        for (key, value) in args.iter() {
            text.push_str(key);
            text.push('=');
            text.push_str(value);
            text.push('\n');
        }
    }
    HandlerOutput::Stream(Box::new(Cursor::new(text.into_bytes())))
}

/// 注册全部内置处理器
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(HandlerUnit::respond("status", status));
    registry.register(HandlerUnit::respond("echo", echo));
}
