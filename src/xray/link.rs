use crate::config::NetworkSettings;

pub const LINK_SCHEME: &str = "vless";

/// Build the `vless://` share link for a client.
///
/// Query parameters appear only when configured, always in the order
/// `flow`, `security`, `type`, `serviceName`; `serviceName` only for gRPC.
/// The label is percent-encoded into the fragment.
pub fn compose(id: &str, label: &str, network: &NetworkSettings) -> String {
    let mut params: Vec<(&str, &str)> = Vec::new();
    if !network.flow.is_empty() {
        params.push(("flow", network.flow.as_str()));
    }
    if !network.security.is_empty() {
        params.push(("security", network.security.as_str()));
    }
    if !network.network.is_empty() {
        params.push(("type", network.network.as_str()));
    }
    if network.network.eq_ignore_ascii_case("grpc") && !network.service_name.is_empty() {
        params.push(("serviceName", network.service_name.as_str()));
    }

    let mut link = format!("{}://{}@{}:{}", LINK_SCHEME, id, network.host, network.port);
    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        link.push('?');
        link.push_str(&query);
    }
    link.push('#');
    link.push_str(&urlencoding::encode(label));
    link
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> NetworkSettings {
        NetworkSettings {
            host: "vpn.example.com".into(),
            port: 443,
            ..Default::default()
        }
    }

    #[test]
    fn bare_link_has_no_query() {
        assert_eq!(
            compose("abc", "user", &net()),
            "vless://abc@vpn.example.com:443#user"
        );
    }

    #[test]
    fn params_follow_fixed_order() {
        let n = NetworkSettings {
            flow: "xtls-rprx-vision".into(),
            security: "reality".into(),
            network: "tcp".into(),
            service_name: "ignored".into(),
            ..net()
        };
        assert_eq!(
            compose("abc", "user", &n),
            "vless://abc@vpn.example.com:443?flow=xtls-rprx-vision&security=reality&type=tcp#user"
        );
    }

    #[test]
    fn service_name_only_for_grpc() {
        let n = NetworkSettings {
            security: "tls".into(),
            network: "GRPC".into(),
            service_name: "tun".into(),
            ..net()
        };
        assert_eq!(
            compose("abc", "user", &n),
            "vless://abc@vpn.example.com:443?security=tls&type=GRPC&serviceName=tun#user"
        );

        let empty_name = NetworkSettings {
            network: "grpc".into(),
            ..net()
        };
        assert_eq!(
            compose("abc", "user", &empty_name),
            "vless://abc@vpn.example.com:443?type=grpc#user"
        );
    }

    #[test]
    fn id_and_label_survive_reparse() {
        let id = "0f8fad5b-d9cb-469f-a165-70867728950e";
        let label = "user_42@vpn.local #primary";
        let n = NetworkSettings {
            security: "tls".into(),
            ..net()
        };
        let link = compose(id, label, &n);
        assert_eq!(link, compose(id, label, &n));

        let rest = link.strip_prefix("vless://").unwrap();
        let (parsed_id, _) = rest.split_once('@').unwrap();
        let (_, fragment) = rest.split_once('#').unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(urlencoding::decode(fragment).unwrap(), label);
    }
}
