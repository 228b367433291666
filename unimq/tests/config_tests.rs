mod common;
use common::*;
use config::{Config, File, FileFormat};
use unimq::{
    ConsumeMode, ConsumerConfig,
    config::{ConsumeFromWhere, MessageModel, load_named_config},
    errors::ConfigError,
};

fn from_yaml(yaml: &str) -> Config {
    Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()
        .unwrap()
}

#[test]
fn consumers_from_default_file() {
    let cfg = load_named_config::<ConsumerConfig>(&CFG, "consumers").unwrap();
    let mut names: Vec<_> = cfg.names().collect();
    names.sort();
    assert_eq!(names, vec!["order", "refund"]);

    let order = cfg.get("order");
    assert_eq!(order.consumer_group, "g-order");
    assert_eq!(order.consume_mode, ConsumeMode::Orderly);
    assert_eq!(order.suspend_current_queue_time_millis, 2000);
    assert_eq!(order.subscriptions.get("order").unwrap(), "paid || created");
    assert_eq!(order.consume_message_batch_max_size, 1);

    let refund = cfg.get("refund");
    assert_eq!(refund.consume_mode, ConsumeMode::Concurrently);
    assert_eq!(refund.consume_thread_min, None);
    assert_eq!(refund.consume_thread_max, Some(8));
    assert_eq!(refund.consume_message_batch_max_size, 16);
    assert_eq!(refund.delay_level_when_next_consume, 3);
    assert_eq!(refund.message_model, MessageModel::Clustering);
    assert_eq!(refund.consume_from_where, ConsumeFromWhere::ConsumeFromLastOffset);
}

#[test]
fn missing_name_falls_back_to_default() {
    let cfg = load_named_config::<ConsumerConfig>(&CFG, "consumers").unwrap();
    let absent = cfg.get("absent");
    assert!(absent.consumer_group.is_empty());
    assert_eq!(absent.delay_level_when_next_consume, 0);
    assert_eq!(absent.suspend_current_queue_time_millis, -1);
    assert_eq!(absent.max_reconsume_times, -1);
}

#[test]
fn missing_section_is_empty() {
    init();
    let cfg = load_named_config::<ConsumerConfig>(&from_yaml("other: 1"), "consumers").unwrap();
    assert_eq!(cfg.names().count(), 0);
}

#[test]
fn concurrent_alias_accepted() {
    init();
    let yaml = r#"
consumers:
  audit:
    consumer_group: g-audit
    consume_mode: CONCURRENT
    message_model: BROADCASTING
    consume_from_where: CONSUME_FROM_FIRST_OFFSET
"#;
    let cfg = load_named_config::<ConsumerConfig>(&from_yaml(yaml), "consumers").unwrap();
    let audit = cfg.get("audit");
    assert_eq!(audit.consume_mode, ConsumeMode::Concurrently);
    assert_eq!(audit.message_model, MessageModel::Broadcasting);
    assert_eq!(audit.consume_from_where, ConsumeFromWhere::ConsumeFromFirstOffset);
}

#[test]
fn unknown_consume_mode_rejected() {
    init();
    let yaml = r#"
consumers:
  audit:
    consumer_group: g-audit
    consume_mode: RANDOM
"#;
    let err = load_named_config::<ConsumerConfig>(&from_yaml(yaml), "consumers").unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
    assert!("random".parse::<ConsumeMode>().is_err());
    assert_eq!("orderly".parse::<ConsumeMode>().unwrap(), ConsumeMode::Orderly);
}

#[test]
fn invalid_values_fail_validation() {
    init();
    let yaml = r#"
consumers:
  audit:
    consumer_group: g-audit
    consume_message_batch_max_size: 0
"#;
    let err = load_named_config::<ConsumerConfig>(&from_yaml(yaml), "consumers").unwrap_err();
    match err {
        ConfigError::ValidationError { section, key, .. } => {
            assert_eq!(section, "consumers");
            assert_eq!(key, "audit");
        }
        other => panic!("意外的错误：{other}"),
    }
}
