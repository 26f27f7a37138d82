use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use super::message::{ProtocolError, ProtocolErrorCode, TextMessage};

/// Reads one `MessageName\n` ... `EndMessage\n` frame (§6.2), handling
/// the optional `DataLength`/`Data` pair by switching to a raw byte
/// read for exactly `DataLength` bytes once that line is seen.
/// Returns `Ok(None)` on a clean EOF between messages.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<Result<TextMessage, ProtocolError>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut name_line = String::new();
    let bytes_read = reader.read_line(&mut name_line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let name = name_line.trim_end().to_string();
    if name.is_empty() {
        return Ok(Some(Err(ProtocolError {
            code: ProtocolErrorCode::MessageParse,
            description: "empty message name".to_string(),
            fatal: false,
        })));
    }

    let mut message = TextMessage::new(&name);
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(Some(Err(ProtocolError {
                code: ProtocolErrorCode::MessageParse,
                description: "connection closed mid-message".to_string(),
                fatal: true,
            })));
        }
        let line = line.trim_end();
        if line == "EndMessage" {
            return Ok(Some(Ok(message)));
        }
        if line == "Data" {
            let length: usize = match message.field("DataLength").and_then(|s| s.parse().ok()) {
                Some(n) => n,
                None => {
                    return Ok(Some(Err(ProtocolError {
                        code: ProtocolErrorCode::NumberParse,
                        description: "Data with no valid preceding DataLength".to_string(),
                        fatal: false,
                    })))
                }
            };
            let mut buf = vec![0u8; length];
            reader.read_exact(&mut buf).await?;
            message.data = Some(buf);
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                message.fields.insert(key.to_string(), value.to_string());
            }
            None => {
                return Ok(Some(Err(ProtocolError {
                    code: ProtocolErrorCode::MessageParse,
                    description: format!("malformed field line: {:?}", line),
                    fatal: false,
                })))
            }
        }
    }
}

pub async fn write_message<W>(writer: &mut W, message: &TextMessage) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(&message.to_wire()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_a_simple_message_without_data() {
        let input = b"ClientHello\nName=test\nExpectedVersion=1.0\nEndMessage\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(input));
        let message = read_message(&mut reader).await.unwrap().unwrap().unwrap();
        assert_eq!(message.name, "ClientHello");
        assert_eq!(message.field("Name"), Some("test"));
    }

    #[tokio::test]
    async fn reads_a_message_with_a_data_payload() {
        let mut input = b"ClientPut\nIdentifier=req-1\nURI=CHK@abc\nDataLength=3\nData\n".to_vec();
        input.extend_from_slice(&[9, 8, 7]);
        input.extend_from_slice(b"EndMessage\n");
        let mut reader = BufReader::new(Cursor::new(input));
        let message = read_message(&mut reader).await.unwrap().unwrap().unwrap();
        assert_eq!(message.data, Some(vec![9, 8, 7]));
    }

    #[tokio::test]
    async fn a_clean_eof_between_messages_returns_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }
}
