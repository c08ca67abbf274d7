//! Static lookup of user-facing error messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "fr" => Ok(Locale::Fr),
            other => Err(format!("unsupported locale '{}'", other)),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::En => f.write_str("en"),
            Locale::Fr => f.write_str("fr"),
        }
    }
}

// (code, english, french)
type Entry = (&'static str, &'static str, &'static str);

const UNKNOWN: Entry = (
    "unknown",
    "An unknown error occurred",
    "Une erreur inconnue est survenue",
);

static MESSAGES: &[Entry] = &[
    (
        "timeout",
        "Transaction timed out",
        "La transaction a expiré",
    ),
    (
        "recipient-not-found",
        "Recipient account not found",
        "Compte du destinataire introuvable",
    ),
    (
        "amount-not-transferred",
        "Amount not transferred",
        "Le montant n'a pas été transféré",
    ),
    (
        "invalid-recipient",
        "Invalid recipient",
        "Destinataire invalide",
    ),
    (
        "mint-mismatch",
        "Wrong token was sent",
        "Le mauvais jeton a été envoyé",
    ),
    (
        "sender-frozen",
        "Sender account is frozen",
        "Le compte de l'expéditeur est gelé",
    ),
    (
        "recipient-frozen",
        "Recipient account is frozen",
        "Le compte du destinataire est gelé",
    ),
    (
        "reference-missing",
        "Payment reference missing from transaction",
        "Référence de paiement absente de la transaction",
    ),
    (
        "status-query",
        "Could not confirm the transaction status",
        "Impossible de confirmer le statut de la transaction",
    ),
    (
        "lookup",
        "Could not search for the transaction",
        "Impossible de rechercher la transaction",
    ),
    (
        "amount-missing",
        "No amount to pay",
        "Aucun montant à payer",
    ),
    UNKNOWN,
];

/// Returns the message for `code`, or the generic unknown-error message.
pub fn lookup(code: &str, locale: Locale) -> &'static str {
    let &(_, en, fr) = MESSAGES
        .iter()
        .find(|(c, _, _)| *c == code)
        .unwrap_or(&UNKNOWN);
    match locale {
        Locale::En => en,
        Locale::Fr => fr,
    }
}
