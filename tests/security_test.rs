// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试
    //!
    //! 覆盖范围包括：
    //! - 路径遍历（`..`、编码后的 `..`、符号链接）
    //! - 畸形请求（NUL 字节、非 UTF-8、坏的请求行）
    //! - 超大上传与内存不足

    use std::fs;
    use std::path::Path;

    use htserve::{
        dispatch::Engine,
        exception::Exception,
        handler::{HandlerOutput, HandlerRegistry, HandlerUnit},
        memory::{MemoryControl, MemoryProbe},
        properties::Properties,
        resource::ResourceAccessor,
        state::{DenyAll, ServerState},
        Config, HttpRequestMethod, RequestContext,
    };
    use proptest::prelude::*;
    use tempfile::TempDir;

    struct Fixed(u64);

    impl MemoryProbe for Fixed {
        fn available(&self) -> u64 {
            self.0
        }
    }

    fn engine(root: &Path, extra: &str, available: u64) -> Engine {
        let config = Config::from_toml_str(&format!(
            "www_root = '{}'\n{}",
            root.display(),
            extra
        ))
        .unwrap();
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerUnit::respond("upload", |_, _, _| {
            HandlerOutput::Properties(Properties::new())
        }));
        Engine::new(
            config,
            registry,
            MemoryControl::new(Box::new(Fixed(available)), 0),
            ServerState::new("sec", Box::new(DenyAll)),
        )
    }

    fn status(engine: &Engine, target: &str) -> u16 {
        match RequestContext::new(HttpRequestMethod::Get, target, 0) {
            Ok(request) => engine.serve(&request).status_code(),
            Err(e) => e.status_code(),
        }
    }

    /// 在临时目录旁边放一个“秘密”文件，根目录在其子目录中
    fn jail() -> (TempDir, std::path::PathBuf) {
        let outer = TempDir::new().unwrap();
        fs::write(outer.path().join("secret.txt"), "top secret").unwrap();
        let root = outer.path().join("www");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("ok.txt"), "ok").unwrap();
        (outer, root)
    }

    #[test]
    fn test_path_traversal_rejected() {
        let (_outer, root) = jail();
        let engine = engine(&root, "", u64::MAX);
        assert_eq!(status(&engine, "/ok.txt"), 200);
        for attack in [
            "/../secret.txt",
            "/a/../../secret.txt",
            "/%2e%2e/secret.txt",
            "/%2E%2E%2Fsecret.txt",
            "/..%5csecret.txt",
        ] {
            assert_eq!(status(&engine, attack), 403, "{}", attack);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (outer, root) = jail();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("link.txt")).unwrap();
        let engine = engine(&root, "", u64::MAX);
        assert_eq!(status(&engine, "/link.txt"), 403);
    }

    #[test]
    fn test_nul_byte_rejected() {
        let (_outer, root) = jail();
        let engine = engine(&root, "", u64::MAX);
        assert_eq!(status(&engine, "/ok.txt%00.html"), 400);
    }

    #[test]
    fn test_malformed_heads() {
        let parse = |raw: &[u8]| RequestContext::parse_head(raw, 0).unwrap_err();
        assert_eq!(parse(b"GET /\r\n\r\n"), Exception::MalformedRequest);
        assert_eq!(parse(b"\xff\xfe / HTTP/1.1\r\n\r\n"), Exception::RequestIsNotUtf8);
        assert_eq!(parse(b"BREW / HTTP/1.1\r\n\r\n"), Exception::UnSupportedRequestMethod);
        assert_eq!(parse(b"GET / HTTP/3\r\n\r\n"), Exception::UnsupportedHttpVersion);
    }

    fn upload(engine: &Engine, body: &[u8]) -> u16 {
        let request = RequestContext::new(HttpRequestMethod::Post, "/upload.html", 0)
            .unwrap()
            .with_header("Content-Type", "multipart/form-data; boundary=B")
            .with_header("Content-Length", &body.len().to_string())
            .with_body(body.to_vec());
        engine.serve(&request).status_code()
    }

    #[test]
    fn test_oversized_upload_is_413() {
        let (_outer, root) = jail();
        let engine = engine(&root, "max_upload_size = 16", u64::MAX);
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B--\r\n";
        assert_eq!(upload(&engine, body), 413);
    }

    #[test]
    fn test_low_memory_upload_is_503() {
        let (_outer, root) = jail();
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B--\r\n";
        // 需要 3 倍请求体长度的可用内存
        let engine = engine(&root, "", body.len() as u64 * 3 - 1);
        assert_eq!(upload(&engine, body), 503);
    }

    proptest! {
        /// 任意由普通段与 `..` 段组成的路径，解析结果都不会离开根目录
        #[test]
        fn test_resolution_never_escapes_root(
            segments in prop::collection::vec(
                prop_oneof![
                    Just("..".to_string()),
                    Just(".".to_string()),
                    Just("www".to_string()),
                    Just("secret.txt".to_string()),
                    "[a-z]{1,6}",
                ],
                1..6,
            )
        ) {
            let (_outer, root) = jail();
            let config = Config::from_toml_str(&format!("www_root = '{}'", root.display())).unwrap();
            let accessor = ResourceAccessor::from_config(&config);
            let path = format!("/{}", segments.join("/"));
            let canonical_root = fs::canonicalize(&root).unwrap();
            match accessor.resolve(&path) {
                Ok(resource) if resource.exists() => {
                    prop_assert!(resource.path().starts_with(&canonical_root));
                }
                Ok(_) => {}
                Err(e) => prop_assert_eq!(e, Exception::Forbidden),
            }
        }
    }
}
