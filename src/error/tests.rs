use super::*;

#[test]
fn test_error_kinds() {
    let err = MetaError::InvalidTypeInfo {
        name: "Shape".into(),
        reason: "class size too small".into(),
    };
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(MetaError::invalid_operation("x").kind(), ErrorKind::InvalidOperation);
    assert!(MetaError::invalid_operation("x").is_usage_error());
    assert!(!MetaError::invalid_handle("x").is_usage_error());
}

#[test]
fn test_error_display() {
    let err = MetaError::mismatch("Circle", "Square");
    assert_eq!(err.to_string(), "Type mismatch: cannot convert 'Circle' to 'Square'");
}

#[test]
fn test_record_captures_frames() {
    context::clear();
    {
        let _outer = context::frame("outer");
        let _inner = context::frame("inner");
        assert_eq!(context::depth(), 2);
        let _ = fail::<()>(MetaError::invalid_argument("bad"));
    }
    assert_eq!(context::depth(), 0);

    let record = context::last_error().unwrap();
    assert_eq!(record.error.kind(), ErrorKind::InvalidArgument);
    assert_eq!(record.frames, vec!["outer".to_string(), "inner".to_string()]);
    assert_eq!(record.origin(), Some("inner"));
}

#[test]
fn test_or_record_degrades_to_none() {
    context::clear();
    let result: Result<u32> = Err(MetaError::invalid_handle("missing"));
    assert_eq!(result.or_record(), None);
    assert_eq!(
        context::take_last_error().map(|r| r.error.kind()),
        Some(ErrorKind::InvalidHandle)
    );
    assert!(context::last_error().is_none());

    let ok: Result<u32> = Ok(7);
    assert_eq!(ok.or_record(), Some(7));
    assert!(context::last_error().is_none());
}

#[test]
fn test_frames_are_per_thread() {
    let _frame = context::frame("main-thread");
    std::thread::spawn(|| {
        assert_eq!(context::depth(), 0);
        assert!(context::last_error().is_none());
    })
    .join()
    .unwrap();
    assert_eq!(context::frames(), vec!["main-thread".to_string()]);
}
