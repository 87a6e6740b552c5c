use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Someone to notify when the user triggers an SOS
pub struct EmergencyContact {
    pub name: String,
    pub relation: String,
    pub phone: String,
}

impl EmergencyContact {
    pub fn new(
        name: impl Into<String>,
        relation: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relation: relation.into(),
            phone: phone.into(),
        }
    }

    pub fn validate(&self) -> Result {
        if self.name.trim().is_empty() {
            bail!("Name is required");
        }
        if self.relation.trim().is_empty() {
            bail!("Relation is required");
        }
        if self.phone.trim().chars().count() < 10 {
            bail!("Phone number is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// In-memory list of emergency contacts, nothing here is persisted
pub struct ContactBook {
    contacts: Vec<EmergencyContact>,
}

impl Default for ContactBook {
    fn default() -> Self {
        Self {
            contacts: vec![
                EmergencyContact::new("Jane Doe", "Spouse", "(555) 123-4567"),
                EmergencyContact::new("John Smith", "Friend", "(555) 987-6543"),
            ],
        }
    }
}

impl ContactBook {
    pub fn empty() -> Self {
        Self { contacts: vec![] }
    }

    pub fn contacts(&self) -> &[EmergencyContact] {
        &self.contacts
    }

    pub fn add(&mut self, contact: EmergencyContact) -> Result {
        contact.validate()?;
        self.contacts.push(contact);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<EmergencyContact> {
        if index >= self.contacts.len() {
            return Err(anyhow!("No contact at position {index}"));
        }
        Ok(self.contacts.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_contacts() {
        let book = ContactBook::default();
        assert_eq!(book.contacts().len(), 2);
        assert!(book.contacts().iter().all(|c| c.validate().is_ok()));
    }

    #[test]
    fn test_add_validates() {
        let mut book = ContactBook::empty();

        let err = book
            .add(EmergencyContact::new("", "Sibling", "5551234567"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Name is required");

        let err = book
            .add(EmergencyContact::new("Sam", " ", "5551234567"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Relation is required");

        let err = book
            .add(EmergencyContact::new("Sam", "Sibling", "555-1234"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Phone number is required");

        assert!(book.contacts().is_empty());

        book.add(EmergencyContact::new("Sam", "Sibling", "5551234567"))
            .unwrap();
        assert_eq!(book.contacts()[0].name, "Sam");
    }

    #[test]
    fn test_remove() {
        let mut book = ContactBook::default();
        let removed = book.remove(0).unwrap();
        assert_eq!(removed.name, "Jane Doe");
        assert_eq!(book.contacts()[0].name, "John Smith");
        assert!(book.remove(5).is_err());
    }
}
