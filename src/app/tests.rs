use super::*;
use crate::model::AppConfig;
use crate::services::runner::JobPoll;
use crate::settings::Settings;
use serde_json::json;

fn default_tree() -> Arc<MenuTree> {
    let s = Settings::defaults().unwrap();
    Arc::new(MenuTree::build(&AppConfig::from_settings(&s).unwrap()).unwrap())
}

fn nav() -> Navigator {
    Navigator::new(default_tree(), NavOptions::default())
}

fn press(nav: &mut Navigator, events: &[InputEvent]) -> Vec<Effect> {
    events.iter().flat_map(|e| nav.handle_input(*e)).collect()
}

fn type_text(nav: &mut Navigator, text: &str) {
    for c in text.chars() {
        nav.handle_input(InputEvent::TextChar(c));
    }
}

fn poll(id: JobId, status: JobStatus, output: &[u8], next_offset: usize) -> JobPoll {
    JobPoll {
        id,
        status,
        elapsed: Duration::from_millis(1500),
        output: output.to_vec(),
        next_offset,
        truncated: false,
        archive: None,
    }
}

fn open_quick_scan(nav: &mut Navigator) {
    use InputEvent::*;
    // root -> Pentest Tools -> Nmap -> Quick Scan
    press(nav, &[Select, Select, Select]);
    assert_eq!(
        nav.cursor_ids(),
        ["root", "pentest_tools", "nmap", "quick_scan"]
    );
}

#[test]
fn up_down_wrap_within_bounds() {
    use InputEvent::*;
    let mut nav = nav();
    // root has five children
    nav.handle_input(Up);
    assert_eq!(nav.selection_index(), 4);
    nav.handle_input(Down);
    assert_eq!(nav.selection_index(), 0);
    let seq = [Down, Down, Up, Down, Down, Down, Up, Up, Up, Up, Down];
    for ev in seq.iter().cycle().take(200) {
        nav.handle_input(*ev);
        assert!(nav.selection_index() < 5);
    }
}

#[test]
fn back_at_root_is_a_no_op() {
    let mut nav = nav();
    for _ in 0..5 {
        assert!(nav.handle_input(InputEvent::Back).is_empty());
        assert!(nav.handle_input(InputEvent::Left).is_empty());
        assert_eq!(nav.cursor_ids(), ["root"]);
    }
}

#[test]
fn back_restores_parent_selection() {
    use InputEvent::*;
    let mut nav = nav();
    press(&mut nav, &[Down, Select]);
    assert_eq!(nav.cursor_ids(), ["root", "system_info"]);
    assert_eq!(nav.selection_index(), 0);
    nav.handle_input(Back);
    assert_eq!(nav.cursor_ids(), ["root"]);
    assert_eq!(nav.selection_index(), 1);
}

#[test]
fn left_and_right_map_to_back_and_select() {
    use InputEvent::*;
    let mut nav = nav();
    nav.handle_input(Right);
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools"]);
    nav.handle_input(Left);
    assert_eq!(nav.cursor_ids(), ["root"]);
}

#[test]
fn quick_scan_collects_target_and_launches() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    match &nav.current_view().screen {
        Screen::Prompt { param, total, .. } => {
            assert_eq!(param, "target");
            assert_eq!(*total, 1);
        }
        other => panic!("expected prompt, got {other:?}"),
    }
    type_text(&mut nav, "192.168.1.1x");
    nav.handle_input(Delete);
    assert_eq!(nav.pending_input(), "192.168.1.1");

    let effects = nav.handle_input(Select);
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        Effect::Launch(req) => {
            assert_eq!(req.command.argv, ["nmap", "-T4", "-F", "192.168.1.1"]);
            assert_eq!(req.tool_id, "nmap");
            assert_eq!(req.command_id, "quick_scan");
            assert_eq!(req.target, "192.168.1.1");
            assert_eq!(req.timeout, Duration::from_secs(1800));
        }
        other => panic!("unexpected effect {other:?}"),
    }
    assert_eq!(nav.pending_input(), "");
    let view = nav.current_view();
    let job = view.job().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.command, "nmap -T4 -F 192.168.1.1");
}

#[test]
fn select_with_empty_input_is_ignored() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    assert!(nav.handle_input(Select).is_empty());
    type_text(&mut nav, "   ");
    assert!(nav.handle_input(Select).is_empty());
    assert!(!nav.has_active_job());
}

#[test]
fn back_from_prompt_returns_to_parent() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "10.0.0.1");
    nav.handle_input(Back);
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "nmap"]);
    assert_eq!(nav.pending_input(), "");
    assert!(matches!(nav.current_view().screen, Screen::Menu { .. }));
}

#[test]
fn rapid_selects_launch_exactly_once() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "192.168.1.1");
    let effects = press(&mut nav, &[Select, Select, Select]);
    let launches = effects
        .iter()
        .filter(|e| matches!(e, Effect::Launch(_)))
        .count();
    assert_eq!(launches, 1);

    update(&mut nav, NavMsg::JobStarted { job: 7 });
    update(
        &mut nav,
        NavMsg::JobProgress(poll(7, JobStatus::Running, b"", 0)),
    );
    // running: everything except Back is ignored
    for ev in [Select, Up, Down, Left, Right, Delete, TextChar('x')] {
        assert!(nav.handle_input(ev).is_empty());
    }
    assert_eq!(nav.active_job_id(), Some(7));
    assert_eq!(
        nav.cursor_ids(),
        ["root", "pentest_tools", "nmap", "quick_scan"]
    );
}

#[test]
fn back_while_running_requests_cancel_once() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "h");
    nav.handle_input(Select);
    update(&mut nav, NavMsg::JobStarted { job: 3 });
    let effects = nav.handle_input(Back);
    assert!(matches!(effects.as_slice(), [Effect::Cancel(3)]));
    assert!(nav.handle_input(Back).is_empty());
    assert!(nav.has_active_job());

    update(
        &mut nav,
        NavMsg::JobProgress(poll(3, JobStatus::Cancelled, b"partial", 7)),
    );
    let view = nav.current_view();
    assert_eq!(view.job().unwrap().status, JobStatus::Cancelled);
    assert_eq!(view.job().unwrap().output, "partial");
    nav.handle_input(Back);
    assert!(!nav.has_active_job());
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "nmap"]);
}

#[test]
fn output_is_decoded_incrementally_across_split_characters() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "h");
    nav.handle_input(Select);
    update(&mut nav, NavMsg::JobStarted { job: 5 });
    assert_eq!(nav.job_sync_point(), Some((5, 0)));

    update(
        &mut nav,
        NavMsg::JobProgress(poll(5, JobStatus::Running, b"caf\xC3", 4)),
    );
    assert_eq!(nav.current_view().job().unwrap().output, "caf");
    assert_eq!(nav.job_sync_point(), Some((5, 4)));
    // a repeated poll from an old offset adds nothing
    update(
        &mut nav,
        NavMsg::JobProgress(poll(5, JobStatus::Running, b"", 4)),
    );
    update(
        &mut nav,
        NavMsg::JobProgress(poll(5, JobStatus::Running, b"\xA9 \xFF ok", 10)),
    );
    assert_eq!(nav.current_view().job().unwrap().output, "caf\u{e9} \u{fffd} ok");
    update(
        &mut nav,
        NavMsg::JobProgress(poll(5, JobStatus::Completed { exit_code: 0 }, b"\xE2\x82", 12)),
    );
    assert!(nav.current_view().job().unwrap().output.ends_with("ok\u{fffd}"));
}

#[test]
fn cancel_before_runner_accepts_is_forwarded() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "h");
    nav.handle_input(Select);
    assert!(nav.handle_input(Back).is_empty());
    let effects = update(&mut nav, NavMsg::JobStarted { job: 9 });
    assert!(matches!(effects.as_slice(), [Effect::Cancel(9)]));
}

#[test]
fn terminal_job_is_acknowledged_and_output_accumulates() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "192.168.1.1");
    nav.handle_input(Select);
    update(&mut nav, NavMsg::JobStarted { job: 1 });
    update(
        &mut nav,
        NavMsg::JobProgress(poll(1, JobStatus::Running, b"Starting Nmap\n", 14)),
    );
    assert_eq!(nav.job_sync_point(), Some((1, 14)));
    let mut done = poll(1, JobStatus::Completed { exit_code: 0 }, b"Host is up\n", 25);
    done.archive = Some(Ok("nmap_192.168.1.1_20240101_120000.txt".into()));
    update(&mut nav, NavMsg::JobProgress(done));

    let view = nav.current_view();
    let job = view.job().unwrap();
    assert!(job.terminal);
    assert_eq!(job.output, "Starting Nmap\nHost is up\n");
    assert_eq!(
        job.artifact.as_deref(),
        Some("nmap_192.168.1.1_20240101_120000.txt")
    );

    // a late poll can never move a terminal job backwards
    update(
        &mut nav,
        NavMsg::JobProgress(poll(1, JobStatus::Running, b"", 25)),
    );
    assert_eq!(
        nav.current_view().job().unwrap().status,
        JobStatus::Completed { exit_code: 0 }
    );

    nav.handle_input(Select);
    assert!(!nav.has_active_job());
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "nmap"]);
    assert_eq!(nav.selection_index(), 0);
}

#[test]
fn launch_failure_is_shown_and_navigation_stays_responsive() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "x");
    nav.handle_input(Select);
    update(&mut nav, NavMsg::JobStarted { job: 2 });
    let failed = JobStatus::Failed {
        reason: "failed to launch 'nmap': No such file or directory".into(),
    };
    update(&mut nav, NavMsg::JobProgress(poll(2, failed.clone(), b"", 0)));
    assert_eq!(nav.current_view().job().unwrap().status, failed);
    nav.handle_input(Back);
    nav.handle_input(Down);
    assert_eq!(nav.selection_index(), 1);
}

#[test]
fn store_failure_becomes_a_notice_and_output_stays() {
    use InputEvent::*;
    let mut nav = nav();
    open_quick_scan(&mut nav);
    type_text(&mut nav, "x");
    nav.handle_input(Select);
    update(&mut nav, NavMsg::JobStarted { job: 4 });
    let mut done = poll(4, JobStatus::Completed { exit_code: 0 }, b"data", 4);
    done.archive = Some(Err("writing \"results\": No space left on device".into()));
    update(&mut nav, NavMsg::JobProgress(done));
    let view = nav.current_view();
    assert!(view.notice.as_deref().unwrap().starts_with("result not saved"));
    assert_eq!(view.job().unwrap().output, "data");
    assert_eq!(view.job().unwrap().artifact, None);
}

#[test]
fn action_launches_on_select() {
    use InputEvent::*;
    let mut nav = nav();
    // root -> System Info -> Hardware Info
    let effects = press(&mut nav, &[Down, Select, Select]);
    match effects.as_slice() {
        [Effect::Launch(req)] => {
            assert_eq!(req.command.argv, ["uname", "-a"]);
            assert_eq!(req.target, "na");
            assert_eq!(req.tool_id, "system");
        }
        other => panic!("unexpected effects {other:?}"),
    }
    assert_eq!(nav.cursor_ids(), ["root", "system_info", "hardware"]);
}

#[test]
fn add_network_asks_for_ssid_then_password() {
    use InputEvent::*;
    let mut nav = nav();
    // root -> Network Settings -> Add Network
    press(&mut nav, &[Down, Down, Select, Down, Down, Select]);
    assert_eq!(nav.cursor_ids(), ["root", "network_settings", "add"]);
    type_text(&mut nav, "homenet");
    assert!(nav.handle_input(Select).is_empty());
    match &nav.current_view().screen {
        Screen::Prompt { param, index, .. } => {
            assert_eq!(param, "password");
            assert_eq!(*index, 1);
        }
        other => panic!("expected prompt, got {other:?}"),
    }
    type_text(&mut nav, "s3cret");
    match nav.handle_input(Select).as_slice() {
        [Effect::Launch(req)] => {
            assert_eq!(
                req.command.argv,
                ["nmcli", "device", "wifi", "connect", "homenet", "password", "s3cret"]
            );
            assert_eq!(req.tool_id, "network");
            assert_eq!(req.target, "homenet");
            assert_eq!(req.timeout, Duration::from_secs(60));
        }
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn power_off_is_a_root_action() {
    use InputEvent::*;
    let mut nav = nav();
    let effects = press(&mut nav, &[Up, Up, Select]);
    match effects.as_slice() {
        [Effect::Launch(req)] => assert_eq!(req.command.argv, ["shutdown", "-h", "now"]),
        other => panic!("unexpected effects {other:?}"),
    }
    assert_eq!(nav.cursor_ids(), ["root", "power_off"]);
}

#[test]
fn custom_command_splats_and_uses_node_timeout() {
    use InputEvent::*;
    let mut nav = nav();
    // Pentest Tools -> Custom Command (fifth entry)
    press(&mut nav, &[Select, Down, Down, Down, Down, Select]);
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "custom"]);
    type_text(&mut nav, "ping -c 1 'my host'");
    match nav.handle_input(Select).as_slice() {
        [Effect::Launch(req)] => {
            assert_eq!(req.command.argv, ["ping", "-c", "1", "my host"]);
            assert_eq!(req.timeout, Duration::from_secs(600));
            assert_eq!(req.target, "ping -c 1 'my host'");
        }
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn unresolvable_value_keeps_the_prompt() {
    use InputEvent::*;
    let mut nav = nav();
    press(&mut nav, &[Select, Down, Down, Down, Down, Select]);
    type_text(&mut nav, "echo 'open");
    assert!(nav.handle_input(Select).is_empty());
    assert!(!nav.has_active_job());
    assert_eq!(nav.pending_input(), "echo 'open");
    assert!(nav.notice().unwrap().contains("unbalanced quotes"));
    // the notice goes away with the next accepted input
    nav.handle_input(Delete);
    assert!(nav.notice().is_none());
}

#[test]
fn multiple_parameters_are_prompted_in_order() {
    use InputEvent::*;
    let s = Settings::from_value(json!({
        "menu": [{"id": "fetch", "title": "Fetch", "tool": "curl",
                  "command": "curl http://{host}:{port}/"}]
    }));
    let tree = Arc::new(MenuTree::build(&AppConfig::from_settings(&s).unwrap()).unwrap());
    let mut nav = Navigator::new(tree, NavOptions::default());
    nav.handle_input(Select);
    type_text(&mut nav, "example.org");
    assert!(nav.handle_input(Select).is_empty());
    match &nav.current_view().screen {
        Screen::Prompt { param, index, .. } => {
            assert_eq!(param, "port");
            assert_eq!(*index, 1);
        }
        other => panic!("expected prompt, got {other:?}"),
    }
    type_text(&mut nav, "8080");
    match nav.handle_input(Select).as_slice() {
        [Effect::Launch(req)] => {
            assert_eq!(req.command.argv, ["curl", "http://example.org:8080/"]);
            assert_eq!(req.target, "example.org");
        }
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn results_leaf_lists_and_opens_artifacts() {
    use InputEvent::*;
    let mut nav = nav();
    let effects = press(&mut nav, &[Select, Up, Select]);
    assert!(matches!(effects.as_slice(), [Effect::ListResults]));
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "results"]);
    assert!(matches!(
        nav.current_view().screen,
        Screen::Results { loading: true, .. }
    ));

    let now = chrono::Local::now();
    let artifact = |name: &str| ResultArtifact {
        filename: name.into(),
        size: 10,
        created_at: now,
    };
    update(
        &mut nav,
        NavMsg::ResultsListed(Ok(vec![artifact("b.txt"), artifact("a.txt")])),
    );
    nav.handle_input(Down);
    nav.handle_input(Down);
    match nav.handle_input(Select).as_slice() {
        [Effect::OpenArtifact(name)] => assert_eq!(name, "a.txt"),
        other => panic!("unexpected effects {other:?}"),
    }
    update(
        &mut nav,
        NavMsg::ArtifactLoaded {
            name: "a.txt".into(),
            outcome: Ok(b"line one\nline two\n".to_vec()),
        },
    );
    nav.handle_input(Down);
    match &nav.current_view().screen {
        Screen::Results {
            document: Some(doc),
            ..
        } => {
            assert_eq!(doc.lines, ["line one", "line two"]);
            assert_eq!(doc.scroll, 1);
        }
        other => panic!("expected document, got {other:?}"),
    }
    nav.handle_input(Back);
    assert!(matches!(
        nav.current_view().screen,
        Screen::Results { document: None, .. }
    ));
    nav.handle_input(Back);
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools"]);
}

#[test]
fn missing_artifact_shows_notice() {
    use InputEvent::*;
    let mut nav = nav();
    press(&mut nav, &[Select, Up, Select]);
    update(&mut nav, NavMsg::ResultsListed(Ok(Vec::new())));
    assert!(nav.handle_input(Select).is_empty());

    update(
        &mut nav,
        NavMsg::ResultsListed(Ok(vec![ResultArtifact {
            filename: "gone.txt".into(),
            size: 1,
            created_at: chrono::Local::now(),
        }])),
    );
    assert_eq!(nav.handle_input(Select).len(), 1);
    update(
        &mut nav,
        NavMsg::ArtifactLoaded {
            name: "gone.txt".into(),
            outcome: Err("result 'gone.txt' not found".into()),
        },
    );
    assert_eq!(nav.notice(), Some("result 'gone.txt' not found"));
}

#[test]
fn late_artifact_for_another_entry_is_dropped() {
    use InputEvent::*;
    let mut nav = nav();
    press(&mut nav, &[Select, Up, Select]);
    let now = chrono::Local::now();
    let artifact = |name: &str| ResultArtifact {
        filename: name.into(),
        size: 10,
        created_at: now,
    };
    update(
        &mut nav,
        NavMsg::ResultsListed(Ok(vec![artifact("b.txt"), artifact("a.txt")])),
    );
    nav.handle_input(Select);
    // the highlight moves before the read comes back
    nav.handle_input(Down);
    update(
        &mut nav,
        NavMsg::ArtifactLoaded {
            name: "b.txt".into(),
            outcome: Ok(b"old".to_vec()),
        },
    );
    assert!(matches!(
        nav.current_view().screen,
        Screen::Results { document: None, selected: 1, .. }
    ));
}

#[test]
fn text_leaf_scrolls_and_returns() {
    use InputEvent::*;
    let mut nav = nav();
    press(&mut nav, &[Up, Select]);
    assert_eq!(nav.cursor_ids(), ["root", "about"]);
    press(&mut nav, &[Down, Down, Down, Down, Down, Down, Down]);
    match &nav.current_view().screen {
        Screen::Text { lines, scroll } => {
            assert_eq!(*scroll, lines.len() - 1);
            assert!(lines[0].starts_with("Pen-Deck"));
        }
        other => panic!("expected text, got {other:?}"),
    }
    nav.handle_input(Back);
    assert_eq!(nav.cursor_ids(), ["root"]);
    assert_eq!(nav.selection_index(), 4);
}

#[test]
fn unavailable_tools_are_marked_and_refused() {
    use InputEvent::*;
    let tree = default_tree();
    let quick = tree
        .find(&["root", "pentest_tools", "nmap", "quick_scan"])
        .unwrap();
    let mut nav = Navigator::new(tree, NavOptions::default());
    nav.set_unavailable([quick].into_iter().collect());
    press(&mut nav, &[Select, Select]);
    match &nav.current_view().screen {
        Screen::Menu { items, .. } => {
            assert!(!items[0].available);
            assert!(items[1].available);
        }
        other => panic!("expected menu, got {other:?}"),
    }
    nav.handle_input(Select);
    assert_eq!(nav.cursor_ids(), ["root", "pentest_tools", "nmap"]);
    assert_eq!(nav.notice(), Some("nmap is not installed"));
}

#[test]
fn offset_follows_selection() {
    use InputEvent::*;
    let opts = NavOptions {
        visible_rows: 2,
        ..NavOptions::default()
    };
    let mut nav = Navigator::new(default_tree(), opts);
    nav.handle_input(Select);
    let offset = |nav: &Navigator| match nav.current_view().screen {
        Screen::Menu { offset, .. } => offset,
        _ => usize::MAX,
    };
    press(&mut nav, &[Down, Down]);
    assert_eq!(nav.selection_index(), 2);
    assert_eq!(offset(&nav), 1);
    nav.handle_input(Up);
    nav.handle_input(Up);
    assert_eq!(offset(&nav), 0);
    // wrapping to the last of six entries scrolls to the bottom window
    nav.handle_input(Up);
    assert_eq!(nav.selection_index(), 5);
    assert_eq!(offset(&nav), 4);
}

#[test]
fn view_model_serialises_for_the_web() {
    let nav = nav();
    let v = serde_json::to_value(nav.current_view()).unwrap();
    assert_eq!(v["breadcrumb"], json!(["Pen-Deck"]));
    assert_eq!(v["screen"]["type"], "menu");
    assert_eq!(v["screen"]["items"][0]["label"], "Pentest Tools");
    assert_eq!(v["screen"]["items"][0]["kind"], "submenu");
}
