// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发
//!
//! [`Engine`] 把一个已解析的请求变成一个 [`Response`]：
//! 1. 路径对应已注册的处理单元时，调用处理器并渲染模板；
//! 2. 否则在资源根目录中查找静态资源，处理目录重定向、欢迎页与目录浏览；
//! 3. 静态文件交给范围协商模块发送。
//!
//! 模板中的 include 会以子请求的形式重新进入第 1 步，
//! 嵌套层数与耗时都有上限，超限的 include 得到空内容。

use std::time::{Duration as StdDuration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};

use crate::{
    args::Arguments,
    body::decode_body,
    cache::HandlerCache,
    config::Config,
    exception::Exception,
    handler::{class_name, extension, HandlerOutput, HandlerRegistry},
    memory::MemoryControl,
    multipart,
    param::{mime_by_extension, HttpEncoding, HttpRequestMethod, ALLOWED_METHODS},
    properties::{AUTHENTICATE, LOCATION},
    range::{self, evaluate_conditionals, Conditional},
    request::RequestContext,
    resource::{listing_json, Resource, ResourceAccessor},
    response::{Body, Response},
    state::{ServerState, SERVLETS_CALLED, SERVLETS_SUBMITTED},
    template::TemplateEngine,
    util::HtmlBuilder,
};

/// 目录浏览页面的过期时间
const LISTING_EXPIRES_SECS: i64 = 10;

/// include 子请求的嵌套层数与截止时间
#[derive(Debug, Clone, Copy)]
struct IncludeGuard {
    depth: usize,
    deadline: Instant,
}

pub struct Engine {
    config: Config,
    accessor: ResourceAccessor,
    registry: HandlerRegistry,
    cache: HandlerCache,
    memory: MemoryControl,
    state: ServerState,
    templates: TemplateEngine,
}

impl Engine {
    pub fn new(
        config: Config,
        registry: HandlerRegistry,
        memory: MemoryControl,
        state: ServerState,
    ) -> Self {
        Self {
            accessor: ResourceAccessor::from_config(&config),
            templates: TemplateEngine::from_config(&config),
            cache: HandlerCache::new(),
            config,
            registry,
            memory,
            state,
        }
    }

    /// 处理一个请求，所有错误都转成对应状态码的响应
    pub fn serve(&self, request: &RequestContext) -> Response {
        let id = request.id();
        let result = match request.method() {
            method if !ALLOWED_METHODS.contains(&method) => {
                Err(Exception::UnSupportedRequestMethod)
            }
            HttpRequestMethod::Options => Ok(Response::options()),
            _ => self.dispatch(request, None),
        };
        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.status_code() >= 500 {
                    error!("[ID{}]处理{}失败：{}", id, request.path(), e);
                } else {
                    debug!("[ID{}]{}：{}", id, request.path(), e);
                }
                Response::from_exception(&e)
            }
        };
        if request.method() == HttpRequestMethod::Head {
            response.set_head_only(true);
        }
        info!(
            "[ID{}]{} {} {} {}",
            id,
            request.client().unwrap_or("-"),
            request.method(),
            request.path(),
            response.status_code()
        );
        response
    }

    fn dispatch(
        &self,
        request: &RequestContext,
        guard: Option<IncludeGuard>,
    ) -> Result<Response, Exception> {
        let id = request.id();
        let path = request.path();
        let included = guard.is_some();

        // 带 Range 的请求和以 / 结尾的路径只当作静态资源
        if !request.headers().contains("Range") && !path.ends_with('/') {
            if let Some(class) = class_name(path).filter(|c| self.registry.contains(c)) {
                debug!("[ID{}]{}由处理器{}处理", id, path, class);
                return self.handle_template(request, &class, guard);
            }
        }

        let resource = self.accessor.resolve(path)?;
        if !resource.exists() {
            if path.len() > 1 && path.ends_with('/') {
                let stripped = &path[..path.len() - 1];
                let file = self.accessor.resolve(stripped)?;
                if file.exists() && !file.is_dir() {
                    debug!("[ID{}]文件路径带有/，重定向", id);
                    return Ok(Response::redirect(&request.path_with_query(stripped)));
                }
            }
            debug!("[ID{}]资源不存在：{}", id, path);
            return Err(Exception::FileNotFound);
        }

        if !resource.is_dir() {
            if path.len() > 1 && path.ends_with('/') {
                let stripped = &path[..path.len() - 1];
                return Ok(Response::redirect(&request.path_with_query(stripped)));
            }
            return range::serve(&resource, request, self.config.accept_ranges(), included);
        }

        if !path.ends_with('/') {
            debug!("[ID{}]目录路径缺少/，重定向", id);
            let with_slash = format!("{}/", path);
            return Ok(Response::redirect(&request.path_with_query(&with_slash)));
        }
        if let Some(welcome) = self.accessor.welcome_file(path) {
            debug!("[ID{}]转发到欢迎页{}", id, welcome);
            return self.dispatch(&request.forward(&welcome), guard);
        }
        self.listing(request, &resource, included)
    }

    fn listing(
        &self,
        request: &RequestContext,
        resource: &Resource,
        included: bool,
    ) -> Result<Response, Exception> {
        if !self.config.dir_allowed() {
            debug!("[ID{}]目录浏览被禁用", request.id());
            return Err(Exception::Forbidden);
        }
        let last_modified = resource.last_modified_utc();
        if !included && request.method() != HttpRequestMethod::Head {
            match evaluate_conditionals(request.headers(), last_modified)? {
                Conditional::NotModified => return Ok(Response::not_modified()),
                Conditional::PreconditionFailed => {
                    return Ok(Response::from_status_code(412, None))
                }
                Conditional::Proceed => {}
            }
        }

        let entries = resource.list()?;
        let wants_json = request
            .header("Accept")
            .map(|a| a.contains("application/json"))
            .unwrap_or(false);
        let mut response = if wants_json {
            Response::from_bytes("application/json", listing_json(&entries))
        } else {
            let html = HtmlBuilder::from_listing(request.path(), &entries).build();
            Response::from_bytes("text/html; charset=utf-8", html)
        };
        response.set_header("Cache-Control", "no-cache, no-store");
        response.set_date_header("Expires", Utc::now() + Duration::seconds(LISTING_EXPIRES_SECS));
        if let Some(t) = last_modified {
            response.set_date_header("Last-Modified", t);
        }
        Ok(response)
    }

    /// 合并 POST 请求体中的表单字段
    fn collect_arguments(&self, request: &RequestContext) -> Result<Arguments, Exception> {
        let mut args = request.args().clone();
        if request.method() != HttpRequestMethod::Post || request.body().is_empty() {
            return Ok(args);
        }
        let declared = request.content_length().unwrap_or(request.body().len() as u64);
        if declared > self.config.max_upload_size() {
            return Err(Exception::UploadTooLarge(declared));
        }
        let encoding = request
            .header("Content-Encoding")
            .and_then(HttpEncoding::from_header);
        let content_type = request.content_type().unwrap_or("");
        let media = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let limit = self.config.max_upload_size();
        match media.as_str() {
            "multipart/form-data" => {
                let body = decode_body(request.body(), encoding, limit)?;
                let length = declared.max(body.len() as u64);
                multipart::parse(
                    &body,
                    content_type,
                    length,
                    &mut args,
                    &self.config,
                    &self.memory,
                )?;
            }
            "application/x-www-form-urlencoded" => {
                let body = decode_body(request.body(), encoding, limit)?;
                args.merge_query(&String::from_utf8_lossy(&body));
            }
            _ => debug!("[ID{}]忽略类型为{}的请求体", request.id(), content_type),
        }
        Ok(args)
    }

    fn handle_template(
        &self,
        request: &RequestContext,
        class: &str,
        guard: Option<IncludeGuard>,
    ) -> Result<Response, Exception> {
        let id = request.id();
        let path = request.path();
        let ext = extension(path);
        let now = Utc::now();

        let respond = self.cache.resolve(class, &self.registry, &self.memory)?;
        let args = self.collect_arguments(request)?;
        let output = if args.is_empty() {
            respond(request, None, &self.state)
        } else {
            respond(request, Some(&args), &self.state)
        };

        let mut response = match output {
            HandlerOutput::Image { bytes, is_static } => {
                if bytes.is_empty() {
                    return Err(Exception::EmptyImage);
                }
                let mut response =
                    Response::from_bytes(mime_by_extension(ext, "text/html"), Bytes::from(bytes));
                if is_static {
                    response.set_date_header("Expires", now + Duration::hours(1));
                } else {
                    response.set_date_header("Expires", template_expires(path, now));
                }
                response
            }
            HandlerOutput::Stream(reader) => {
                let mut response = Response::new();
                response.set_header("Content-Type", mime_by_extension(ext, "text/html"));
                response.set_body(Body::Stream(reader), None);
                response.set_date_header("Expires", template_expires(path, now));
                response
            }
            HandlerOutput::Properties(mut props) => {
                if props.contains(AUTHENTICATE) {
                    if self.state.access_level(request) < 1 {
                        debug!("[ID{}]处理器要求认证", id);
                        let mut response = Response::from_status_code(401, None);
                        response.set_header(
                            "WWW-Authenticate",
                            format!("Basic realm=\"{}\"", self.config.auth_realm()),
                        );
                        return Ok(response);
                    }
                } else if props.contains(LOCATION) {
                    let location = props.get_text(LOCATION).unwrap_or_default();
                    let location = if location.is_empty() {
                        path.to_string()
                    } else {
                        location
                    };
                    debug!("[ID{}]处理器要求重定向到{}", id, location);
                    return Ok(Response::redirect(&location));
                }

                let template = self.accessor.resolve_localized(path)?;
                if !template.exists() || template.is_dir() {
                    warn!("[ID{}]处理器{}没有对应的模板", id, class);
                    return Err(Exception::FileNotFound);
                }
                self.state.append_path(SERVLETS_CALLED, path);
                if !args.is_empty() {
                    self.state.append_path(SERVLETS_SUBMITTED, path);
                }
                self.state.add_standard_properties(&mut props, request);

                let raw = template.read_all()?;
                let substituted = self.templates.substitute(&raw, &props);
                let body = self.expand_includes(request, &substituted, guard);
                let mut response =
                    Response::from_bytes(mime_by_extension(ext, "text/html"), Bytes::from(body));
                response.set_date_header("Expires", template_expires(path, now));
                response
            }
        };
        response.set_date_header("Last-Modified", now);
        Ok(response)
    }

    fn expand_includes(
        &self,
        request: &RequestContext,
        body: &[u8],
        guard: Option<IncludeGuard>,
    ) -> Vec<u8> {
        let depth = guard.map_or(0, |g| g.depth) + 1;
        let max_depth = self.config.include_max_depth();
        let budget_ms = self.config.include_timeout_ms();
        let budget = StdDuration::from_millis(budget_ms);

        self.templates.expand_includes(body, request.id(), |target| {
            if depth > max_depth {
                return Err(Exception::IncludeDepthExceeded(max_depth));
            }
            let started = Instant::now();
            let own = started + budget;
            let deadline = match guard {
                Some(g) => g.deadline.min(own),
                None => own,
            };
            if started >= deadline {
                return Err(Exception::IncludeTimeout(budget_ms));
            }
            let sub = request
                .derive(target)?
                .without_header("Range")
                .without_header("Request-Range");
            let response = self.dispatch(&sub, Some(IncludeGuard { depth, deadline }))?;
            match response.status_code() {
                200..=299 => {}
                404 => return Err(Exception::FileNotFound),
                403 => return Err(Exception::Forbidden),
                code => return Err(Exception::DispatchError(format!("状态码{}", code))),
            }
            let content = response.into_body_bytes()?;
            if Instant::now() > deadline {
                return Err(Exception::IncludeTimeout(budget_ms));
            }
            Ok(content)
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &HandlerCache {
        &self.cache
    }

    pub fn memory(&self) -> &MemoryControl {
        &self.memory
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

/// 模板响应的过期时间：样式表一小时，png 一分钟，其余立即过期
fn template_expires(path: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if path.ends_with(".css") {
        now + Duration::hours(1)
    } else if path.ends_with(".png") {
        now + Duration::minutes(1)
    } else {
        now
    }
}
