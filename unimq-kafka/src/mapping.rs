//! Kafka 记录与框架消息之间的映射

use bytes::Bytes;
use rdkafka::message::{Header, Headers, OwnedHeaders};
use std::collections::HashMap;
use unimq::message::{Message, MessageExt};

/// 标签消息头
pub const TAGS_HEADER: &str = "TAGS";
/// 重新消费次数消息头
pub const RECONSUME_TIMES_HEADER: &str = "RECONSUME_TIMES";
/// 死信与重试消息的原主题消息头
pub const ORIGIN_TOPIC_HEADER: &str = "ORIGIN_TOPIC";
/// 重试消息的到期时间消息头（毫秒时间戳）
pub const RETRY_DUE_HEADER: &str = "RETRY_DUE_AT";

/// 由 Kafka 记录构造消费端消息
pub(crate) fn to_message_ext<M: rdkafka::Message>(msg: &M) -> MessageExt {
    let mut tags = None;
    let mut reconsume_times = 0;
    let mut properties = HashMap::new();
    if let Some(headers) = msg.headers() {
        for header in headers.iter() {
            let Some(value) = header.value else {
                continue;
            };
            let value = String::from_utf8_lossy(value).into_owned();
            match header.key {
                TAGS_HEADER => tags = Some(value),
                RECONSUME_TIMES_HEADER => reconsume_times = value.parse().unwrap_or(0),
                key => {
                    properties.insert(key.to_owned(), value);
                }
            }
        }
    }

    MessageExt {
        msg_id: format!("{}-{}-{}", msg.topic(), msg.partition(), msg.offset()),
        topic: msg.topic().to_owned(),
        tags,
        keys: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        queue_id: msg.partition(),
        queue_offset: msg.offset(),
        reconsume_times,
        born_timestamp: msg.timestamp().to_millis().unwrap_or(0),
        body: msg.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
        properties,
    }
}

/// 待发送消息的消息头
pub(crate) fn message_headers(msg: &Message) -> OwnedHeaders {
    build_headers(msg.tags.as_deref(), None, &msg.properties)
}

/// 死信消息的消息头，保留原标签、属性与重新消费次数
pub(crate) fn dead_letter_headers(msg: &MessageExt) -> OwnedHeaders {
    let mut properties = msg.properties.clone();
    properties.insert(ORIGIN_TOPIC_HEADER.to_owned(), msg.topic.clone());
    build_headers(msg.tags.as_deref(), Some(msg.reconsume_times), &properties)
}

/// 重试消息的消息头，记录原主题与到期时间
pub(crate) fn retry_headers(msg: &MessageExt, due_at: i64) -> OwnedHeaders {
    let mut properties = msg.properties.clone();
    properties.insert(ORIGIN_TOPIC_HEADER.to_owned(), msg.topic.clone());
    properties.insert(RETRY_DUE_HEADER.to_owned(), due_at.to_string());
    build_headers(msg.tags.as_deref(), Some(msg.reconsume_times), &properties)
}

/// 还原重试主题中的消息：恢复原主题，取出到期时间
pub(crate) fn restore_retry(mut msg: MessageExt) -> (MessageExt, Option<i64>) {
    if let Some(topic) = msg.properties.remove(ORIGIN_TOPIC_HEADER) {
        msg.topic = topic;
    }
    let due_at = msg
        .properties
        .remove(RETRY_DUE_HEADER)
        .and_then(|v| v.parse().ok());
    (msg, due_at)
}

fn build_headers(
    tags: Option<&str>,
    reconsume_times: Option<i32>,
    properties: &HashMap<String, String>,
) -> OwnedHeaders {
    let mut headers = OwnedHeaders::new_with_capacity(properties.len() + 2);
    if let Some(tags) = tags {
        headers = headers.insert(Header {
            key: TAGS_HEADER,
            value: Some(tags),
        });
    }
    if let Some(times) = reconsume_times {
        headers = headers.insert(Header {
            key: RECONSUME_TIMES_HEADER,
            value: Some(times.to_string().as_str()),
        });
    }
    for (key, value) in properties {
        headers = headers.insert(Header {
            key: key.as_str(),
            value: Some(value.as_str()),
        });
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::{Timestamp, message::OwnedMessage};

    fn record(headers: Option<OwnedHeaders>) -> OwnedMessage {
        OwnedMessage::new(
            Some(b"payload".to_vec()),
            Some(b"order-1".to_vec()),
            "order".to_owned(),
            Timestamp::CreateTime(1_700_000_000_000),
            3,
            42,
            headers,
        )
    }

    #[test]
    fn record_mapped_to_message_ext() {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: TAGS_HEADER,
                value: Some("paid"),
            })
            .insert(Header {
                key: RECONSUME_TIMES_HEADER,
                value: Some("2"),
            })
            .insert(Header {
                key: "trace",
                value: Some("t-1"),
            });

        let ext = to_message_ext(&record(Some(headers)));

        assert_eq!(ext.msg_id, "order-3-42");
        assert_eq!(ext.tags.as_deref(), Some("paid"));
        assert_eq!(ext.keys.as_deref(), Some("order-1"));
        assert_eq!(ext.queue_id, 3);
        assert_eq!(ext.queue_offset, 42);
        assert_eq!(ext.reconsume_times, 2);
        assert_eq!(ext.born_timestamp, 1_700_000_000_000);
        assert_eq!(&ext.body[..], b"payload");
        assert_eq!(ext.properties.get("trace").map(String::as_str), Some("t-1"));
        assert!(!ext.properties.contains_key(TAGS_HEADER));
    }

    #[test]
    fn missing_headers_use_defaults() {
        let ext = to_message_ext(&record(None));
        assert_eq!(ext.tags, None);
        assert_eq!(ext.reconsume_times, 0);
        assert!(ext.properties.is_empty());
    }

    #[test]
    fn dead_letter_headers_carry_origin() {
        let ext = MessageExt {
            reconsume_times: 5,
            ..to_message_ext(&record(None))
        };
        let headers = dead_letter_headers(&ext);
        let back = to_message_ext(&OwnedMessage::new(
            None,
            None,
            "g.DLQ".to_owned(),
            Timestamp::NotAvailable,
            0,
            0,
            Some(headers),
        ));

        assert_eq!(back.reconsume_times, 5);
        assert_eq!(
            back.properties.get(ORIGIN_TOPIC_HEADER).map(String::as_str),
            Some("order")
        );
        assert_eq!(back.born_timestamp, 0);
        assert!(back.body.is_empty());
    }

    #[test]
    fn retry_headers_restored() {
        let ext = MessageExt {
            tags: Some("paid".to_owned()),
            ..to_message_ext(&record(None))
        }
        .redelivered();
        let headers = retry_headers(&ext, 1_700_000_060_000);
        let (back, due_at) = restore_retry(to_message_ext(&OwnedMessage::new(
            Some(b"payload".to_vec()),
            None,
            "g.RETRY".to_owned(),
            Timestamp::NotAvailable,
            1,
            7,
            Some(headers),
        )));

        assert_eq!(due_at, Some(1_700_000_060_000));
        assert_eq!(back.topic, "order");
        assert_eq!(back.tags.as_deref(), Some("paid"));
        assert_eq!(back.reconsume_times, 1);
        assert_eq!((back.queue_id, back.queue_offset), (1, 7));
        assert!(back.properties.is_empty());
    }

    #[test]
    fn plain_message_not_restored() {
        let (back, due_at) = restore_retry(to_message_ext(&record(None)));
        assert_eq!(back.topic, "order");
        assert_eq!(due_at, None);
    }

    #[test]
    fn message_headers_include_tags_and_properties() {
        let msg = Message::new("order", "x")
            .with_tags("paid")
            .with_property("trace", "t-9");
        let headers = message_headers(&msg);
        assert_eq!(headers.count(), 2);
        let tags = headers.iter().find(|h| h.key == TAGS_HEADER).and_then(|h| h.value);
        assert_eq!(tags, Some(&b"paid"[..]));
    }
}
