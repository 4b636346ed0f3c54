use guestgate::validate::RawAccessRequest;
use serde_json::{json, Value};

/// Builder for guest contact forms
#[derive(Clone)]
pub struct AccessForm {
    name: String,
    email: String,
    phone: String,
    mac: String,
    username: Option<String>,
}

impl AccessForm {
    pub fn new(mac: &str) -> Self {
        Self {
            name: "Maria Silva".to_string(),
            email: "maria@example.com".to_string(),
            phone: "(11) 98765-4321".to_string(),
            mac: mac.to_string(),
            username: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = phone.to_string();
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn json(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "email": self.email,
            "phone": self.phone,
            "mac": self.mac,
        });
        if let Some(username) = &self.username {
            body["username"] = json!(username);
        }
        body
    }

    pub fn raw(&self) -> RawAccessRequest {
        serde_json::from_value(self.json()).expect("form serializes to a request")
    }
}

/// Distinct, valid hardware address for the n-th simulated device
pub fn device_mac(n: u8) -> String {
    format!("02:00:00:00:00:{:02x}", n)
}
