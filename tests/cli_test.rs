//! CLI Command Tests
//!
//! Argument parsing, JSON output shapes and exit codes of the command
//! handlers, run against temp data directories and mocked servers.

// =============================================================================
// CLI Argument Parsing Tests
// =============================================================================

mod cli_parsing {
    use clap::Parser;
    use echolingo::cli::{Cli, Command, ConfigAction, PlayerArg, SchemeArg};

    #[test]
    fn test_config_set_full() {
        let cli = Cli::parse_from([
            "echolingo",
            "config",
            "set",
            "-H",
            "dav.example.com",
            "--scheme",
            "http",
            "-P",
            "8080",
            "--path",
            "remote.php/dav",
            "-u",
            "alice",
            "-p",
            "pw",
            "--no-test",
        ]);
        match cli.command {
            Command::Config(cmd) => match cmd.action {
                ConfigAction::Set(set) => {
                    assert_eq!(set.scheme, SchemeArg::Http);
                    assert_eq!(set.port, Some(8080));
                    assert_eq!(set.path, "remote.php/dav");
                    assert!(set.no_test);
                }
                _ => panic!("Expected config set"),
            },
            _ => panic!("Expected config"),
        }
    }

    #[test]
    fn test_config_set_requires_credentials() {
        let result = Cli::try_parse_from(["echolingo", "config", "set", "-H", "dav.example.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_aliases() {
        let cli = Cli::parse_from(["echolingo", "cfg", "show"]);
        assert!(matches!(cli.command, Command::Config(_)));

        let cli = Cli::parse_from(["echolingo", "cap", "a.srt"]);
        assert!(matches!(cli.command, Command::Captions(_)));

        let cli = Cli::parse_from(["echolingo", "pl", "/a.mp4"]);
        assert!(matches!(cli.command, Command::Play(_)));
    }

    #[test]
    fn test_ls_media_only() {
        let cli = Cli::parse_from(["echolingo", "ls", "/Movies", "-m"]);
        match cli.command {
            Command::Ls(cmd) => {
                assert_eq!(cmd.path, "/Movies");
                assert!(cmd.media_only);
            }
            _ => panic!("Expected ls"),
        }
    }

    #[test]
    fn test_captions_at() {
        let cli = Cli::parse_from(["echolingo", "captions", "a.srt", "--at", "00:01:05.5"]);
        match cli.command {
            Command::Captions(cmd) => {
                assert_eq!(cmd.parse_at(), Some(Ok(65.5)));
            }
            _ => panic!("Expected captions"),
        }

        let cli = Cli::parse_from(["echolingo", "captions", "a.srt", "-a", "soon"]);
        match cli.command {
            Command::Captions(cmd) => assert!(matches!(cmd.parse_at(), Some(Err(_)))),
            _ => panic!("Expected captions"),
        }
    }

    #[test]
    fn test_play_player_and_port() {
        let cli = Cli::parse_from(["echolingo", "play", "/a.mp4", "--player", "mpv", "--port", "19000"]);
        match cli.command {
            Command::Play(cmd) => {
                assert_eq!(cmd.player, Some(PlayerArg::Mpv));
                assert_eq!(cmd.port, Some(19000));
                assert!(cmd.subs.is_empty());
            }
            _ => panic!("Expected play"),
        }
    }

    #[test]
    fn test_invalid_player_rejected() {
        assert!(Cli::try_parse_from(["echolingo", "play", "/a.mp4", "--player", "quicktime"]).is_err());
    }
}

// =============================================================================
// JSON Output Format Tests
// =============================================================================

mod json_output {
    use echolingo::cli::{ExitCode, JsonOutput, ServedFile, StatusOk};

    #[test]
    fn test_success_omits_error_and_exit_code() {
        let output = JsonOutput::success(StatusOk::default());
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["data"]["status"], "ok");
        assert!(json.get("error").is_none());
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_error_carries_exit_code() {
        let output = JsonOutput::<()>::error_msg("Authentication failed", ExitCode::AuthFailed);
        let json = serde_json::to_value(&output).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "Authentication failed");
        assert_eq!(json["exit_code"], 6);
    }

    #[test]
    fn test_served_file_without_size() {
        let file = ServedFile {
            path: "/a.mkv".to_string(),
            url: "http://127.0.0.1:18080/abc".to_string(),
            content_type: "video/x-matroska".to_string(),
            size: None,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["url"], "http://127.0.0.1:18080/abc");
        assert!(json.get("size").is_none());
    }
}

// =============================================================================
// Exit Code Tests
// =============================================================================

mod exit_codes {
    use echolingo::cli::ExitCode;
    use echolingo::ErrorKind;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ExitCode::Success,
            ExitCode::Error,
            ExitCode::InvalidArgs,
            ExitCode::NetworkError,
            ExitCode::NotConfigured,
            ExitCode::NotFound,
            ExitCode::AuthFailed,
            ExitCode::ParseFailed,
            ExitCode::PlayerFailed,
        ];
        let mut values: Vec<i32> = codes.iter().map(|c| i32::from(*c)).collect();
        values.dedup();
        assert_eq!(values, (0..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ExitCode::for_kind(ErrorKind::NotFound), ExitCode::NotFound);
        assert_eq!(ExitCode::for_kind(ErrorKind::Unreachable), ExitCode::NetworkError);
        assert_eq!(ExitCode::for_kind(ErrorKind::Upstream), ExitCode::NetworkError);
        assert_eq!(ExitCode::for_kind(ErrorKind::ParseFailed), ExitCode::ParseFailed);
        assert_eq!(ExitCode::for_kind(ErrorKind::BindExhausted), ExitCode::Error);
    }
}

// =============================================================================
// Command Handler Tests
// =============================================================================

mod handlers {
    use mockito::Server;
    use std::io::Write;
    use tempfile::TempDir;

    use echolingo::cli::{
        CaptionsCmd, ConfigAction, ConfigCmd, ConfigSetCmd, ExitCode, LsCmd, Output, SchemeArg,
    };
    use echolingo::commands::{self, Context};
    use echolingo::config::Config;
    use echolingo::credentials::CredentialStore;

    fn quiet_json() -> Output {
        Output {
            json: true,
            quiet: true,
        }
    }

    fn context(dir: &TempDir) -> Context {
        Context {
            config: Config::default(),
            data_dir: Some(dir.path().to_path_buf()),
        }
    }

    fn set_cmd(host: &str, port: u16, no_test: bool) -> ConfigCmd {
        ConfigCmd {
            action: ConfigAction::Set(ConfigSetCmd {
                host: host.to_string(),
                scheme: SchemeArg::Http,
                port: Some(port),
                path: "/dav".to_string(),
                username: "alice".to_string(),
                password: "pw".to_string(),
                no_test,
            }),
        }
    }

    #[tokio::test]
    async fn test_show_without_config() {
        let dir = TempDir::new().unwrap();
        let cmd = ConfigCmd {
            action: ConfigAction::Show,
        };
        let code = commands::config_cmd(cmd, &context(&dir), &quiet_json()).await;
        assert_eq!(code, ExitCode::NotConfigured);
    }

    #[tokio::test]
    async fn test_set_without_test_then_clear() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let code = commands::config_cmd(set_cmd("dav.example.com", 443, true), &ctx, &quiet_json()).await;
        assert_eq!(code, ExitCode::Success);

        let stored = CredentialStore::open(dir.path()).await.load().await.unwrap();
        assert_eq!(stored.host, "dav.example.com");

        let clear = ConfigCmd {
            action: ConfigAction::Clear,
        };
        assert_eq!(commands::config_cmd(clear, &ctx, &quiet_json()).await, ExitCode::Success);
        assert!(CredentialStore::open(dir.path()).await.load().await.is_none());
    }

    #[tokio::test]
    async fn test_set_with_failing_test_saves_nothing() {
        let mut server = Server::new_async().await;
        server
            .mock("PROPFIND", "/dav/")
            .with_status(401)
            .create_async()
            .await;
        let addr = server.socket_address();

        let dir = TempDir::new().unwrap();
        let cmd = set_cmd(&addr.ip().to_string(), addr.port(), false);
        let code = commands::config_cmd(cmd, &context(&dir), &quiet_json()).await;

        assert_eq!(code, ExitCode::AuthFailed);
        assert!(CredentialStore::open(dir.path()).await.load().await.is_none());
    }

    #[tokio::test]
    async fn test_ls_without_config() {
        let dir = TempDir::new().unwrap();
        let cmd = LsCmd {
            path: "/".to_string(),
            media_only: false,
        };
        let code = commands::ls_cmd(cmd, &context(&dir), &quiet_json()).await;
        assert_eq!(code, ExitCode::NotConfigured);
    }

    #[tokio::test]
    async fn test_captions_command() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lesson.srt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();

        let ok = CaptionsCmd {
            source: path.to_string_lossy().into_owned(),
            at: Some("1.5".to_string()),
        };
        assert_eq!(
            commands::captions_cmd(ok, &context(&dir), &quiet_json()).await,
            ExitCode::Success
        );

        let bad_time = CaptionsCmd {
            source: path.to_string_lossy().into_owned(),
            at: Some("later".to_string()),
        };
        assert_eq!(
            commands::captions_cmd(bad_time, &context(&dir), &quiet_json()).await,
            ExitCode::InvalidArgs
        );

        let missing = CaptionsCmd {
            source: dir.path().join("nope.srt").to_string_lossy().into_owned(),
            at: None,
        };
        assert_eq!(
            commands::captions_cmd(missing, &context(&dir), &quiet_json()).await,
            ExitCode::NotFound
        );
    }
}
