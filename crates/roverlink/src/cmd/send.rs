use roverlink_link::{ChannelConfig, EncryptedChannel, WireMode};
use roverlink_transport::resolve;
use tracing::info;

use crate::cmd::{runtime, split_host_port, SendArgs};
use crate::exit::{link_error, transport_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    runtime()?.block_on(send(args))
}

async fn send(args: SendArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let (host, port) = split_host_port(&args.target).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("target must be HOST:PORT, got {:?}", args.target),
        )
    })?;
    let peer = resolve(host, port)
        .await
        .map_err(|err| transport_error("cannot resolve target", err))?;

    let key = args.link.derive_key()?;
    let config = ChannelConfig {
        peer,
        bind: None,
        mode: WireMode::Framed,
    };
    let mut channel = EncryptedChannel::open(config, key)
        .await
        .map_err(|err| link_error("cannot open socket", err))?;
    let sent = channel
        .send_framed(&payload)
        .await
        .map_err(|err| link_error("send failed", err))?;

    info!(%peer, payload = payload.len(), datagram = sent, "command sent");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    match &args.data {
        Some(data) => Ok(data.as_bytes().to_vec()),
        None => Err(CliError::new(USAGE, "one of --data or --json is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::LinkArgs;

    fn args(json: Option<&str>, data: Option<&str>) -> SendArgs {
        SendArgs {
            link: LinkArgs {
                password: "pw".into(),
                salt: "salt".into(),
                key_len: 32,
                kdf_rounds: 1,
            },
            target: "127.0.0.1:51234".into(),
            json: json.map(str::to_string),
            data: data.map(str::to_string),
        }
    }

    #[test]
    fn json_payload_is_validated_and_sent_verbatim() {
        let payload = resolve_payload(&args(Some(r#"{ "command": "stop" }"#), None)).unwrap();
        assert_eq!(payload, br#"{ "command": "stop" }"#);

        let err = resolve_payload(&args(Some("{not json"), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn data_payload_is_bytes() {
        let payload = resolve_payload(&args(None, Some("forward 10"))).unwrap();
        assert_eq!(payload, b"forward 10");
        assert_eq!(resolve_payload(&args(None, None)).unwrap_err().code, USAGE);
    }
}
