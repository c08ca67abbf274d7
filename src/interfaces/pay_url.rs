use crate::domain::amount::{Amount, Mint, Recipient};
use crate::domain::session::ReferenceKey;
use crate::error::{PaymentError, Result};
use url::Url;
use url::form_urlencoded;

pub const SCHEME: &str = "solana";

/// Fields of a payable transfer request, as displayed in the checkout QR code.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub recipient: Recipient,
    pub amount: Option<Amount>,
    pub token: Option<Mint>,
    pub reference: Option<ReferenceKey>,
    pub label: Option<String>,
    pub message: Option<String>,
    pub memo: Option<String>,
}

impl TransferRequest {
    pub fn new(recipient: Recipient) -> Self {
        Self {
            recipient,
            amount: None,
            token: None,
            reference: None,
            label: None,
            message: None,
            memo: None,
        }
    }
}

/// Encodes `request` as a `solana:` transfer request URI.
pub fn encode_pay_url(request: &TransferRequest) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some(amount) = &request.amount {
        query.append_pair("amount", &amount.to_string());
    }
    if let Some(token) = &request.token {
        query.append_pair("spl-token", token.as_str());
    }
    if let Some(reference) = &request.reference {
        query.append_pair("reference", reference.as_str());
    }
    if let Some(label) = &request.label {
        query.append_pair("label", label);
    }
    if let Some(message) = &request.message {
        query.append_pair("message", message);
    }
    if let Some(memo) = &request.memo {
        query.append_pair("memo", memo);
    }
    let query = query.finish();

    if query.is_empty() {
        format!("{}:{}", SCHEME, request.recipient)
    } else {
        format!("{}:{}?{}", SCHEME, request.recipient, query)
    }
}

/// Decodes a URI produced by [`encode_pay_url`].
pub fn parse_pay_url(input: &str) -> Result<TransferRequest> {
    let url = Url::parse(input).map_err(|e| PaymentError::PayUrl(e.to_string()))?;
    if url.scheme() != SCHEME {
        return Err(PaymentError::PayUrl(format!(
            "unexpected scheme '{}'",
            url.scheme()
        )));
    }

    let mut request = TransferRequest::new(Recipient::parse(url.path())?);
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "amount" => request.amount = Some(value.parse()?),
            "spl-token" => request.token = Some(Mint::parse(&value)?),
            "reference" => request.reference = Some(ReferenceKey::parse(&value)?),
            "label" => request.label = Some(value.into_owned()),
            "message" => request.message = Some(value.into_owned()),
            "memo" => request.memo = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::PublicKey;
    use rust_decimal_macros::dec;

    fn recipient() -> Recipient {
        PublicKey::from_bytes([3u8; 32])
    }

    #[test]
    fn test_bare_recipient_has_no_query() {
        let url = encode_pay_url(&TransferRequest::new(recipient()));
        assert_eq!(url, format!("solana:{}", recipient()));
    }

    #[test]
    fn test_full_request_survives_parsing() {
        let reference = ReferenceKey::generate();
        let request = TransferRequest {
            amount: Some(Amount::new(dec!(12.50)).unwrap()),
            token: Some(PublicKey::from_bytes([9u8; 32])),
            reference: Some(reference.clone()),
            label: Some("Le Petit Café".into()),
            message: Some("Table 4 & 5".into()),
            memo: Some("order#42".into()),
            ..TransferRequest::new(recipient())
        };

        let url = encode_pay_url(&request);
        assert!(url.starts_with("solana:"));
        assert!(url.contains("amount=12.5"));
        assert!(url.contains(&format!("reference={}", reference)));

        assert_eq!(parse_pay_url(&url).unwrap(), request);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let url = format!("bitcoin:{}", recipient());
        assert!(matches!(parse_pay_url(&url), Err(PaymentError::PayUrl(_))));
    }

    #[test]
    fn test_parse_rejects_bad_amount() {
        let url = format!("solana:{}?amount=-3", recipient());
        assert!(parse_pay_url(&url).is_err());
    }
}
