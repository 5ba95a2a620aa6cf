use serde::{Deserialize, Serialize};

/// Structured address as returned by the providers
///
/// Field names on the wire follow the providers' Portuguese JSON keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "logradouro", default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    #[serde(rename = "complemento", default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,

    #[serde(rename = "bairro", default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,

    #[serde(rename = "localidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(rename = "uf", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gia: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub siafi: Option<String>,
}

impl Address {
    /// Drops blank fields (providers send "" for unknown values)
    pub fn cleaned(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            street: keep(self.street),
            complement: keep(self.complement),
            neighborhood: keep(self.neighborhood),
            city: keep(self.city),
            state: keep(self.state),
            ibge: keep(self.ibge),
            gia: keep(self.gia),
            ddd: keep(self.ddd),
            siafi: keep(self.siafi),
        }
    }
}

/// Final answer for one postal code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A provider (or the cache) knows the address
    Found(Address),
    /// The code is confirmed absent
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::Found(address) => Some(address),
            Self::NotFound => None,
        }
    }
}
