//! Tests for the protocol module
//!
//! These tests pin the wire shape of requests and responses and the
//! validation applied when decoding responses.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_request_creation() {
        let req = CallRequest::new("Add", vec![json!(4), json!(1)]);
        assert_eq!(req.method_name, "Add");
        assert_eq!(req.arity(), 2);
    }

    #[test]
    fn test_request_wire_field_names() {
        let req = CallRequest::new("Bar", vec![json!("x")]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"MethodName": "Bar", "Arguments": ["x"]}));
    }

    #[test]
    fn test_request_without_arguments_field() {
        let req: CallRequest = serde_json::from_str(r#"{"MethodName":"Foo"}"#).unwrap();
        assert_eq!(req.method_name, "Foo");
        assert!(req.arguments.is_empty());
    }

    #[test]
    fn test_fault_wire_shape() {
        let value = serde_json::to_value(CallResponse::fault("boom")).unwrap();
        assert_eq!(
            value,
            json!({"CaughtException": true, "IsBulky": false, "ReturnValue": "boom"})
        );
    }

    #[test]
    fn test_bulky_wire_shape() {
        let value = serde_json::to_value(CallResponse::bulky(1024)).unwrap();
        assert_eq!(
            value,
            json!({"CaughtException": false, "IsBulky": true, "ReturnValue": 1024})
        );
    }

    #[test]
    fn test_plain_response_keeps_value() {
        let resp = CallResponse::plain(json!({"sum": 5}));
        let text = serde_json::to_string(&resp).unwrap();
        let decoded: CallResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, resp);
        assert!(!decoded.is_fault());
    }

    #[test]
    fn test_contradictory_flags_rejected() {
        let text = r#"{"CaughtException":true,"IsBulky":true,"ReturnValue":1}"#;
        assert!(serde_json::from_str::<CallResponse>(text).is_err());
    }

    #[test]
    fn test_bulky_length_must_be_unsigned() {
        let text = r#"{"CaughtException":false,"IsBulky":true,"ReturnValue":-3}"#;
        assert!(serde_json::from_str::<CallResponse>(text).is_err());

        let text = r#"{"CaughtException":false,"IsBulky":true,"ReturnValue":"oops"}"#;
        assert!(serde_json::from_str::<CallResponse>(text).is_err());
    }

    #[test]
    fn test_bulky_length_as_string() {
        let text = r#"{"CaughtException":false,"IsBulky":true,"ReturnValue":"10485760"}"#;
        let decoded: CallResponse = serde_json::from_str(text).unwrap();
        assert_eq!(decoded, CallResponse::bulky(10 * 1024 * 1024));
    }

    #[test]
    fn test_fault_with_non_string_message() {
        let text = r#"{"CaughtException":true,"IsBulky":false,"ReturnValue":{"code":7}}"#;
        let decoded: CallResponse = serde_json::from_str(text).unwrap();
        assert_eq!(decoded, CallResponse::fault(r#"{"code":7}"#));
    }

    #[test]
    fn test_bulk_ack_is_case_insensitive() {
        assert!(is_bulk_ack("READY_FOR_BULK"));
        assert!(is_bulk_ack("ready_for_bulk"));
        assert!(is_bulk_ack("Ready_For_Bulk"));
        assert!(!is_bulk_ack("READY"));
        assert!(!is_bulk_ack(""));
    }

    #[test]
    fn test_bulk_ack_must_match_exactly() {
        assert!(!is_bulk_ack("  READY_FOR_BULK  "));
        assert!(!is_bulk_ack("READY_FOR_BULK\r"));
        assert!(!is_bulk_ack("READY_FOR_BULK!"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(TcpipcError::remote("x").is_recoverable());
        assert!(TcpipcError::Conversion("x".into()).is_recoverable());
        assert!(!TcpipcError::Connection("x".into()).is_recoverable());
        assert!(!TcpipcError::Protocol("x".into()).is_recoverable());
    }
}
