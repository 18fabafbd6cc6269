//! 集成测试
//!
//! 通过会话目录驱动完整的执行生命周期：本地提交、Shell 确认、输出、结束

#[cfg(test)]
mod integration_tests {
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::timeout;
    use url::Url;

    use shell_exec_tracker::{
        CommandLineConfidence, SessionDirectory, ShellIntegrationEvent, Terminal, TerminalHost,
        TerminalId,
    };

    #[derive(Default)]
    struct FakeHost {
        terminals: Mutex<Vec<Terminal>>,
        executed: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn with_terminal(id: u32) -> Arc<Self> {
            let host = Self::default();
            host.terminals
                .lock()
                .push(Terminal::new(TerminalId::new(id), "bash"));
            Arc::new(host)
        }
    }

    impl TerminalHost for FakeHost {
        fn resolve_terminal(&self, id: TerminalId) -> Option<Terminal> {
            self.terminals
                .lock()
                .iter()
                .find(|terminal| terminal.id() == id)
                .cloned()
        }

        fn execute_command(&self, _id: TerminalId, command_line: &str) {
            self.executed.lock().push(command_line.to_string());
        }
    }

    async fn next_event(
        receiver: &mut broadcast::Receiver<ShellIntegrationEvent>,
    ) -> ShellIntegrationEvent {
        timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("等待事件超时")
            .expect("事件通道已关闭")
    }

    #[tokio::test]
    async fn test_local_command_full_lifecycle() {
        let host = FakeHost::with_terminal(1);
        let directory = SessionDirectory::new(host.clone());
        let mut events = directory.subscribe();
        let id = TerminalId::new(1);
        let cwd = Url::parse("file:///workspace").unwrap();

        // 1. Shell 集成激活并上报 CWD
        directory.shell_integration_change(id);
        directory.cwd_change(id, Some(cwd.clone()));
        assert!(matches!(
            next_event(&mut events).await,
            ShellIntegrationEvent::ShellIntegrationChanged { .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ShellIntegrationEvent::ShellIntegrationChanged { .. }
        ));

        // 2. 本地提交命令
        let view = directory.get(id).unwrap();
        let execution = view.execute_command("cargo test").unwrap();
        assert_eq!(host.executed.lock().as_slice(), &["cargo test".to_string()]);
        assert_eq!(execution.cwd(), Some(&cwd));

        // 3. 第一个读者在开始前加入
        let early_reader = execution.read();

        // 4. Shell 确认开始，输出数据
        directory.shell_execution_start(id, "cargo test", CommandLineConfidence::High, true, None);
        match next_event(&mut events).await {
            ShellIntegrationEvent::ExecutionStarted { execution: started, .. } => {
                assert!(Arc::ptr_eq(&started, &execution));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        directory.shell_execution_data(id, "Compiling\n");

        // 5. 第二个读者晚加入，只能看到之后的输出
        let late_reader = execution.read();
        directory.shell_execution_data(id, "test result: ok\n");
        directory.shell_execution_end(id, "cargo test", CommandLineConfidence::High, true, Some(0));

        // 6. 读者读完之前不会收到结束事件
        tokio::task::yield_now().await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        let early: Vec<String> = early_reader.collect().await;
        let late: Vec<String> = late_reader.collect().await;
        assert_eq!(early, vec!["Compiling\n", "test result: ok\n"]);
        assert_eq!(late, vec!["test result: ok\n"]);

        match next_event(&mut events).await {
            ShellIntegrationEvent::ExecutionEnded {
                execution: ended,
                exit_code,
                ..
            } => {
                assert!(Arc::ptr_eq(&ended, &execution));
                assert_eq!(exit_code, Some(0));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // 7. 结束后读取得到空流
        assert!(execution.read().collect::<Vec<_>>().await.is_empty());
        assert!(view.current_execution().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_readers_drain_before_end() {
        let host = FakeHost::with_terminal(7);
        let directory = SessionDirectory::new(host);
        let mut events = directory.subscribe();
        let id = TerminalId::new(7);

        directory.shell_execution_start(id, "find /", CommandLineConfidence::Medium, false, None);
        let _started = next_event(&mut events).await;
        let execution = directory.get(id).unwrap().current_execution().unwrap();

        // 多个读者在独立任务中按各自节奏读取
        let readers: Vec<_> = (0..4)
            .map(|index| {
                let mut output = execution.read();
                tokio::spawn(async move {
                    let mut chunks = Vec::new();
                    while let Some(chunk) = output.next().await {
                        if index % 2 == 0 {
                            tokio::time::sleep(Duration::from_millis(2)).await;
                        }
                        chunks.push(chunk);
                    }
                    chunks
                })
            })
            .collect();

        for line in 0..20 {
            directory.shell_execution_data(id, &format!("/path/{}\n", line));
        }
        directory.shell_execution_end(id, "find /", CommandLineConfidence::High, true, Some(1));

        let ended = next_event(&mut events).await;
        assert!(matches!(ended, ShellIntegrationEvent::ExecutionEnded { .. }));

        // 结束事件到达时，每个读者都已经结束
        for reader in readers {
            assert!(reader.is_finished());
            assert_eq!(reader.await.unwrap().len(), 20);
        }
        assert_eq!(execution.command_line().value, "find /");
        assert!(execution.command_line().is_high_confidence());
    }

    #[tokio::test]
    async fn test_direct_shell_command_and_overlapping_start() {
        let host = FakeHost::with_terminal(3);
        let directory = SessionDirectory::new(host);
        let mut events = directory.subscribe();
        let id = TerminalId::new(3);
        let cwd = Url::parse("file:///tmp").unwrap();

        // 用户直接在 Shell 中输入的命令没有预注册
        directory.shell_execution_start(id, "top", CommandLineConfidence::High, true, Some(cwd.clone()));
        let first = directory.get(id).unwrap().current_execution().unwrap();
        assert_eq!(first.cwd(), Some(&cwd));

        // 未结束就开始新命令：上一个执行被强制结束，没有退出码
        directory.shell_execution_start(id, "htop", CommandLineConfidence::High, true, None);
        let second = directory.get(id).unwrap().current_execution().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let mut ended = Vec::new();
        for _ in 0..3 {
            if let ShellIntegrationEvent::ExecutionEnded {
                execution,
                exit_code,
                ..
            } = next_event(&mut events).await
            {
                ended.push((execution.id(), exit_code));
            }
        }
        assert_eq!(ended, vec![(first.id(), None)]);

        // 终端关闭后当前执行被放弃，不会发出结束事件
        let reader = second.read();
        directory.close_terminal(id);
        assert!(reader.collect::<Vec<_>>().await.is_empty());
        tokio::task::yield_now().await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(directory.is_empty());
    }
}
