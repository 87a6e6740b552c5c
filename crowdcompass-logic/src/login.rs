//! Login form checks. There is no credential backend, the form only has to be filled in and the
//! arithmetic CAPTCHA solved.

use anyhow::bail;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::prelude::*;

pub const INCORRECT_CAPTCHA: &str = "Incorrect CAPTCHA";
pub const NOT_A_NUMBER: &str = "Please enter a number.";

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email_or_phone: String,
    pub password: String,
    /// Answer to the current [LoginChallenge]
    pub captcha: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result {
        if self.email_or_phone.is_empty() {
            bail!("Email or phone number is required");
        }
        if self.password.chars().count() < 6 {
            bail!("Password must be at least 6 characters");
        }
        if leading_int(&self.captcha).is_none() {
            bail!(NOT_A_NUMBER);
        }
        Ok(())
    }
}

/// Integer at the start of `s` after leading whitespace, trailing garbage is ignored
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

/// "What is a + b?" challenge with both operands in `1..=10`
pub struct LoginChallenge {
    rng: ChaCha8Rng,
    operands: (u8, u8),
}

impl LoginChallenge {
    pub fn new(seed: u64) -> Self {
        let mut challenge = Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            operands: (0, 0),
        };
        challenge.regenerate();
        challenge
    }

    pub fn regenerate(&mut self) {
        self.operands = (
            self.rng.random_range(1..=10),
            self.rng.random_range(1..=10),
        );
    }

    pub fn operands(&self) -> (u8, u8) {
        self.operands
    }

    pub fn question(&self) -> String {
        let (a, b) = self.operands;
        format!("What is {a} + {b}?")
    }

    fn expected(&self) -> i64 {
        self.operands.0 as i64 + self.operands.1 as i64
    }

    /// Check an answer. A wrong answer replaces the challenge with a new one.
    pub fn check(&mut self, answer: &str) -> Result {
        let Some(answer) = leading_int(answer) else {
            bail!(NOT_A_NUMBER);
        };
        if answer != self.expected() {
            self.regenerate();
            bail!(INCORRECT_CAPTCHA);
        }
        Ok(())
    }

    /// Validate the whole form, then the CAPTCHA answer in it
    pub fn submit(&mut self, form: &LoginForm) -> Result {
        form.validate()?;
        self.check(&form.captcha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(challenge: &LoginChallenge) -> String {
        let (a, b) = challenge.operands();
        (a + b).to_string()
    }

    #[test]
    fn test_operands_in_range() {
        let mut challenge = LoginChallenge::new(42);
        for _ in 0..100 {
            let (a, b) = challenge.operands();
            assert!((1..=10).contains(&a) && (1..=10).contains(&b));
            challenge.regenerate();
        }
        assert_eq!(
            LoginChallenge::new(9).operands(),
            LoginChallenge::new(9).operands()
        );
    }

    #[test]
    fn test_correct_answer() {
        let mut challenge = LoginChallenge::new(1);
        let before = challenge.operands();
        challenge.check(&answer(&challenge)).unwrap();
        assert_eq!(challenge.operands(), before);
        // Trailing text after the number is ignored
        challenge.check(&format!(" {} apples", answer(&challenge))).unwrap();
    }

    #[test]
    fn test_wrong_answer_regenerates() {
        let mut challenge = LoginChallenge::new(1);
        let mut reference = LoginChallenge::new(1);
        reference.regenerate();

        let err = challenge.check("21").unwrap_err();
        assert_eq!(err.to_string(), INCORRECT_CAPTCHA);
        assert_eq!(challenge.operands(), reference.operands());
    }

    #[test]
    fn test_non_numeric_answer() {
        let mut challenge = LoginChallenge::new(1);
        let before = challenge.operands();
        let err = challenge.check("seven").unwrap_err();
        assert_eq!(err.to_string(), "Please enter a number.");
        assert_eq!(challenge.operands(), before, "Unparsable answer shouldn't regenerate");
    }

    #[test]
    fn test_form_fields() {
        let mut challenge = LoginChallenge::new(3);
        let mut form = LoginForm {
            email_or_phone: String::new(),
            password: "hunter22".to_string(),
            captcha: answer(&challenge),
        };
        let err = challenge.submit(&form).unwrap_err();
        assert_eq!(err.to_string(), "Email or phone number is required");

        form.email_or_phone = "user@example.com".to_string();
        form.password = "12345".to_string();
        let err = challenge.submit(&form).unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");

        form.password = "123456".to_string();
        challenge.submit(&form).unwrap();
    }
}
