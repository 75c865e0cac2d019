//! Record validation.

use super::types::Record;
use crate::constants::ALLOWED_MEDIA_FAMILIES;
use crate::error::{Error, Result};

/// Checks a record before it is written.
///
/// Rejects records that:
/// - Have an empty id, owner or name
/// - Have a zero size, or one that does not fit SQLite's signed integer
/// - Carry no content pointers, or a pointer with an empty location
/// - Have a media type outside the allowed families (`image/*`, `video/*`)
pub fn validate_record(record: &Record) -> Result<()> {
    if record.id.trim().is_empty() {
        return Err(Error::validation("record id cannot be empty"));
    }
    if record.owner_id.trim().is_empty() {
        return Err(Error::validation("record owner cannot be empty"));
    }
    if record.name.trim().is_empty() {
        return Err(Error::validation("record name cannot be empty"));
    }
    if record.size == 0 {
        return Err(Error::validation(format!(
            "record size must be positive: {}",
            record.name
        )));
    }
    if i64::try_from(record.size).is_err() {
        return Err(Error::validation(format!(
            "record size {} is too large",
            record.size
        )));
    }
    if record.content_pointers.is_empty() {
        return Err(Error::validation(format!(
            "record '{}' has no content pointers",
            record.name
        )));
    }
    if record
        .content_pointers
        .iter()
        .any(|p| p.location.trim().is_empty())
    {
        return Err(Error::validation(format!(
            "record '{}' has a content pointer with an empty location",
            record.name
        )));
    }
    validate_media_type(&record.media_type)
}

fn validate_media_type(media_type: &str) -> Result<()> {
    let Some((family, subtype)) = media_type.split_once('/') else {
        return Err(Error::validation(format!(
            "media type must look like 'family/subtype': {media_type:?}"
        )));
    };
    if subtype.trim().is_empty() {
        return Err(Error::validation(format!(
            "media type has an empty subtype: {media_type:?}"
        )));
    }
    let family = family.trim().to_ascii_lowercase();
    if !ALLOWED_MEDIA_FAMILIES.contains(&family.as_str()) {
        return Err(Error::validation(format!(
            "media type {media_type:?} not allowed (expected one of: {})",
            ALLOWED_MEDIA_FAMILIES.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::ContentPointer;

    fn record() -> Record {
        Record::new(
            "u1",
            "IMG_0001.jpg",
            2048,
            "image/jpeg",
            vec![ContentPointer::original("blobs/u1/abc")],
        )
    }

    #[test]
    fn test_valid_record() {
        assert!(validate_record(&record()).is_ok());
        let video = Record {
            media_type: "video/mp4".into(),
            ..record()
        };
        assert!(validate_record(&video).is_ok());
    }

    #[test]
    fn test_rejects_empty_fields() {
        for broken in [
            Record {
                id: String::new(),
                ..record()
            },
            Record {
                owner_id: " ".into(),
                ..record()
            },
            Record {
                name: String::new(),
                ..record()
            },
        ] {
            assert!(matches!(
                validate_record(&broken),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_rejects_zero_size() {
        let r = Record { size: 0, ..record() };
        assert!(validate_record(&r).is_err());
    }

    #[test]
    fn test_rejects_missing_pointers() {
        let r = Record {
            content_pointers: vec![],
            ..record()
        };
        assert!(validate_record(&r).is_err());
        let r = Record {
            content_pointers: vec![ContentPointer::original("")],
            ..record()
        };
        assert!(validate_record(&r).is_err());
    }

    #[test]
    fn test_media_type_allow_list() {
        for bad in ["application/pdf", "text/plain", "image", "image/", "jpeg"] {
            let r = Record {
                media_type: bad.into(),
                ..record()
            };
            assert!(validate_record(&r).is_err(), "{bad} should be rejected");
        }
        let upper = Record {
            media_type: "IMAGE/HEIC".into(),
            ..record()
        };
        assert!(validate_record(&upper).is_ok());
    }
}
