use super::*;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["swm-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["swm-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Migrate)));
}

#[test]
fn parses_catalog_add_with_release_date() {
    let cli = Cli::try_parse_from([
        "swm-cli",
        "catalog",
        "add",
        "620",
        "--name",
        "Portal 2",
        "--release-date",
        "18 Apr, 2011",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Catalog {
            command:
                CatalogCommands::Add {
                    app_id,
                    name,
                    release_date,
                },
        }) => {
            assert_eq!(app_id, "620");
            assert_eq!(name, "Portal 2");
            assert_eq!(release_date.as_deref(), Some("18 Apr, 2011"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn enqueue_defaults_to_default_priority() {
    let cli =
        Cli::try_parse_from(["swm-cli", "enqueue", "10", "20"]).expect("expected valid cli args");

    match cli.command {
        Some(Commands::Enqueue {
            app_ids,
            never_attempted,
            priority,
            ..
        }) => {
            assert_eq!(app_ids, vec!["10".to_string(), "20".to_string()]);
            assert!(!never_attempted);
            assert_eq!(priority, swm_mapper::priority::DEFAULT);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn enqueue_rejects_ids_with_never_attempted() {
    let result = Cli::try_parse_from(["swm-cli", "enqueue", "10", "--never-attempted"]);
    assert!(result.is_err());
}

#[test]
fn process_max_items_requires_drain() {
    assert!(Cli::try_parse_from(["swm-cli", "process", "--max-items", "5"]).is_err());

    let cli = Cli::try_parse_from(["swm-cli", "process", "--drain", "--max-items", "5"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Process {
            batch_size: None,
            drain: true,
            max_items: Some(5),
            json: false,
        })
    ));
}

#[test]
fn status_requires_app_ids() {
    assert!(Cli::try_parse_from(["swm-cli", "status"]).is_err());
}

#[test]
fn retry_parses_repeated_statuses() {
    let cli = Cli::try_parse_from([
        "swm-cli",
        "retry",
        "--status",
        "failed",
        "--status",
        "not_found",
        "--older-than-days",
        "7",
        "--max-attempts",
        "4",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Retry {
            statuses,
            older_than_days,
            max_attempts,
            min_attempts,
            ..
        }) => {
            assert_eq!(statuses, vec![MappingStatus::Failed, MappingStatus::NotFound]);
            assert_eq!(older_than_days, Some(7));
            assert_eq!(max_attempts, Some(4));
            assert_eq!(min_attempts, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn retry_rejects_unknown_and_bogus_statuses() {
    assert!(Cli::try_parse_from(["swm-cli", "retry", "--status", "unknown"]).is_err());
    assert!(Cli::try_parse_from(["swm-cli", "retry", "--status", "lost"]).is_err());
}

#[test]
fn reset_requeue_keeps_priority() {
    let cli = Cli::try_parse_from([
        "swm-cli",
        "reset",
        "10",
        "--requeue",
        "--priority",
        "8",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Reset {
            requeue: true,
            priority: 8,
            ..
        })
    ));
}
