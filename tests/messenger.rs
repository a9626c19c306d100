use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, time::timeout};
use uci_messenger::{
    Config, EngineType, Messenger, MessengerError,
    engine::{ArasanMode, StockfishMode},
};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("uci-messenger-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Every backend in every execution shape, each with its own home directory.
fn configs(test: &str) -> Vec<Config> {
    let resources = scratch(&format!("{test}-resources"));
    fs::write(resources.join("arasan.rc"), "Hash=128\n").unwrap();
    fs::write(resources.join("arasan.nnue"), b"nnue").unwrap();
    fs::write(resources.join("book.bin"), b"book").unwrap();

    let base = |engine, label: &str| Config {
        engine,
        threads: 1,
        shutdown_timeout_ms: 5_000,
        arasan_stack_size: 4 * 1024 * 1024,
        resource_dir: resources.clone(),
        home_dir: Some(scratch(&format!("{test}-{label}"))),
        ..Config::default()
    };

    vec![
        base(EngineType::Stockfish, "sf"),
        Config {
            stockfish_mode: StockfishMode::Monolithic,
            ..base(EngineType::Stockfish, "sf-mono")
        },
        base(EngineType::Lc0, "lc0"),
        base(EngineType::Arasan, "arasan"),
        Config {
            arasan_mode: ArasanMode::Poll,
            ..base(EngineType::Arasan, "arasan-poll")
        },
    ]
}

fn collect(messenger: &Messenger) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    messenger.set_response_handler(move |line: String| {
        let _ = tx.send(line);
    });
    rx
}

async fn wait_for(rx: &mut mpsc::UnboundedReceiver<String>, wanted: &str) -> Vec<String> {
    let mut seen = Vec::new();
    let found = timeout(Duration::from_secs(5), async {
        while let Some(line) = rx.recv().await {
            let done = line == wanted;
            seen.push(line);
            if done {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(found, Ok(true), "never saw '{wanted}'");
    seen
}

#[tokio::test]
async fn start_then_stop_is_silent() {
    for config in configs("silent") {
        let label = format!("{:?}", config);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut messenger = Messenger::with_config(config);
        {
            let calls = Arc::clone(&calls);
            messenger.set_response_handler(move |_: String| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        messenger.start().await.unwrap();
        messenger.stop().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0, "{label}");
    }
}

#[tokio::test]
async fn every_backend_answers_uci() {
    for config in configs("uci") {
        let name = config.engine.name();
        let mut messenger = Messenger::with_config(config);
        let mut rx = collect(&messenger);

        messenger.start().await.unwrap();
        messenger.send_command("uci").unwrap();
        let lines = wait_for(&mut rx, "uciok").await;
        assert!(lines[0].starts_with("id name"), "{name}: {lines:?}");

        messenger.send_command("isready").unwrap();
        wait_for(&mut rx, "readyok").await;
        messenger.stop().await.unwrap();
    }
}

#[tokio::test]
async fn malformed_commands_do_not_end_the_session() {
    for config in configs("malformed") {
        let mut messenger = Messenger::with_config(config);
        let mut rx = collect(&messenger);
        messenger.start().await.unwrap();

        for garbage in [
            "xyzzy",
            "setoption name",
            "setoption name Threads value lots",
            "position fen not-a-fen",
            "position startpos moves e2e5",
            "go searchmoves a1a1",
            "stop",
        ] {
            messenger.send_command(garbage).unwrap();
        }
        messenger.send_command("isready").unwrap();
        wait_for(&mut rx, "readyok").await;

        assert!(messenger.is_running());
        messenger.stop().await.unwrap();
    }
}

#[tokio::test]
async fn searches_from_a_position() {
    for config in configs("search") {
        let mut messenger = Messenger::with_config(config);
        let mut rx = collect(&messenger);
        messenger.start().await.unwrap();

        // the only legal move is the king capture
        messenger
            .send_command("position fen 7k/8/8/8/8/8/6q1/7K w - - 0 1")
            .unwrap();
        messenger.send_command("go depth 1").unwrap();
        wait_for(&mut rx, "bestmove h1g2").await;

        messenger.stop().await.unwrap();
    }
}

#[tokio::test]
async fn session_rules() {
    let mut messenger = Messenger::new(EngineType::Lc0);
    assert!(matches!(
        messenger.send_command("uci"),
        Err(MessengerError::NotRunning)
    ));

    messenger.start().await.unwrap();
    assert!(matches!(
        messenger.start().await,
        Err(MessengerError::AlreadyRunning(EngineType::Lc0))
    ));
    messenger.stop().await.unwrap();

    assert!(matches!(
        messenger.send_command("uci"),
        Err(MessengerError::NotRunning)
    ));
    assert!(matches!(messenger.stop().await, Err(MessengerError::NotRunning)));
}

#[tokio::test]
async fn arasan_home_is_provisioned_on_start() {
    let config = configs("provisioned")
        .into_iter()
        .find(|c| c.engine == EngineType::Arasan)
        .unwrap();
    let home = config.home_dir.clone().unwrap();
    fs::write(home.join("book.bin"), b"outdated").unwrap();

    let mut messenger = Messenger::with_config(config);
    messenger.start().await.unwrap();
    for name in uci_messenger::engine::ARASAN_RESOURCES {
        assert!(home.join(name).is_file(), "{name} missing");
    }
    assert_eq!(fs::read(home.join("book.bin")).unwrap(), b"book");
    messenger.stop().await.unwrap();
}
