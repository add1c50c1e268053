use std::str::FromStr;

use super::error::{Error, ErrorKind};

/// Authorization decision made by the policy service for one request.
/// The engine only enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
	pub can_view: bool,
	pub can_modify: bool,
}

impl Access {
	pub const NONE: Access = Access { can_view: false, can_modify: false };
	pub const VIEW: Access = Access { can_view: true, can_modify: false };
	pub const MODIFY: Access = Access { can_view: true, can_modify: true };

	pub fn require_view(&self) -> Result<(), Error> {
		if self.can_view {
			Ok(())
		} else {
			Err(Error::new(ErrorKind::Forbidden, "not allowed to view this account"))
		}
	}

	pub fn require_modify(&self) -> Result<(), Error> {
		if self.can_modify {
			Ok(())
		} else {
			Err(Error::new(ErrorKind::Forbidden, "not allowed to modify this account"))
		}
	}
}

impl FromStr for Access {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"none" => Ok(Access::NONE),
			"view" => Ok(Access::VIEW),
			"modify" => Ok(Access::MODIFY),
			other => Err(format!("unknown access decision {:?}", other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decisions() {
		assert!(Access::MODIFY.require_modify().is_ok());
		assert!(Access::MODIFY.require_view().is_ok());
		assert_eq!(Access::VIEW.require_modify().unwrap_err().kind(), &ErrorKind::Forbidden);
		assert_eq!(Access::default(), Access::NONE);
		assert!(Access::NONE.require_view().is_err());
	}

	#[test]
	fn parse() {
		assert_eq!("Modify".parse::<Access>().unwrap(), Access::MODIFY);
		assert_eq!("view".parse::<Access>().unwrap(), Access::VIEW);
		assert!("admin".parse::<Access>().is_err());
	}
}
