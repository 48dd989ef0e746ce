use regex::Regex;
use serde_json::{json, Map, Value};

use super::base::{ChatCompletionChunk, ChunkChoice, ChunkDelta, FunctionDelta, ToolCallDelta};
use crate::errors::EndpointError;
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

/// Sentinel payload that closes a chat-completions event stream
pub const STREAM_DONE: &str = "[DONE]";

/// Convert the conversation to chat-completions messages.
///
/// An assistant text followed by tool invocations, or consecutive tool
/// invocations, collapse into a single assistant message carrying `tool_calls`,
/// which is how the endpoint expects a multi-call turn.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec: Vec<Value> = Vec::new();
    // Index of the assistant message that further tool calls should join
    let mut open_assistant: Option<usize> = None;

    for message in messages {
        match message {
            Message::System { content } => {
                messages_spec.push(json!({"role": "system", "content": content}));
                open_assistant = None;
            }
            Message::User { content } => {
                messages_spec.push(json!({"role": "user", "content": content}));
                open_assistant = None;
            }
            Message::AssistantText { content, .. } => {
                let mut converted = json!({"role": "assistant"});
                if !content.is_empty() {
                    converted["content"] = json!(content);
                }
                messages_spec.push(converted);
                open_assistant = Some(messages_spec.len() - 1);
            }
            Message::ToolInvocation(invocation) => {
                let index = match open_assistant {
                    Some(index) => index,
                    None => {
                        messages_spec.push(json!({"role": "assistant"}));
                        messages_spec.len() - 1
                    }
                };
                let call = json!({
                    "id": invocation.call_id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&invocation.name),
                        "arguments": invocation.arguments,
                    }
                });
                if let Some(converted) = messages_spec[index].as_object_mut() {
                    let tool_calls = converted.entry("tool_calls").or_insert(json!([]));
                    if let Some(tool_calls) = tool_calls.as_array_mut() {
                        tool_calls.push(call);
                    }
                }
                open_assistant = Some(index);
            }
            Message::ToolResult(result) => {
                messages_spec.push(json!({
                    "role": "tool",
                    "content": result.output,
                    "tool_call_id": result.call_id,
                }));
                open_assistant = None;
            }
        }
    }

    // An assistant message with neither text nor tool calls is rejected by the endpoint
    messages_spec.retain(|m| {
        m["role"] != "assistant" || m.get("content").is_some() || m.get("tool_calls").is_some()
    });
    messages_spec
}

/// Convert tool specs to chat-completions function tools
pub fn tools_to_openai_spec(tools: &[ToolSpec]) -> Result<Vec<Value>, EndpointError> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(EndpointError::Other(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        let mut function = json!({
            "name": tool.name,
            "parameters": tool.parameters,
        });
        if let Some(description) = &tool.description {
            function["description"] = json!(description);
        }
        result.push(json!({"type": "function", "function": function}));
    }

    Ok(result)
}

/// Convert a non-streamed chat completion into a single chunk, for endpoints
/// that ignore the `stream` flag and answer with one JSON document.
pub fn completion_to_chunk(response: &Value) -> Result<ChatCompletionChunk, EndpointError> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| EndpointError::Decode(format!("no message in completion: {}", response)))?;

    let content = match message.get("content") {
        Some(Value::Null) | None => None,
        Some(content) => Some(
            serde_json::from_value::<Content>(content.clone())
                .map_err(|e| EndpointError::Decode(e.to_string()))?,
        ),
    };

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(index, call)| ToolCallDelta {
                    index: Some(index),
                    id: call["id"].as_str().map(String::from),
                    function: Some(FunctionDelta {
                        name: call["function"]["name"].as_str().map(String::from),
                        arguments: Some(match &call["function"]["arguments"] {
                            Value::String(arguments) => arguments.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        }),
                    }),
                })
                .collect::<Vec<_>>()
        });

    let usage = response
        .get("usage")
        .and_then(|usage| serde_json::from_value(usage.clone()).ok());

    Ok(ChatCompletionChunk {
        id: response["id"].as_str().map(String::from),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant".to_string()),
                content,
                tool_calls,
            },
            finish_reason: response["choices"][0]["finish_reason"]
                .as_str()
                .map(String::from),
        }],
        usage,
    })
}

/// Decode the payload of one `data:` line, surfacing in-band errors
pub fn parse_chunk(data: &str) -> Result<ChatCompletionChunk, EndpointError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| EndpointError::Decode(format!("{}: {}", e, data)))?;
    if let Some(error) = error_payload(&value) {
        return Err(endpoint_error_from_body(&error));
    }
    serde_json::from_value(value).map_err(|e| EndpointError::Decode(format!("{}: {}", e, data)))
}

/// Find the error object in an endpoint response, if it carries one.
///
/// OpenAI-style bodies nest it under `error`; Databricks bodies put
/// `error_code` and `message` at the top level.
pub fn error_payload(body: &Value) -> Option<Value> {
    if let Some(error) = body.get("error") {
        return Some(match error {
            Value::String(message) => json!({"message": message}),
            other => other.clone(),
        });
    }
    if body.get("error_code").is_some() {
        return Some(body.clone());
    }
    None
}

/// Classify an error payload, recognizing context-length failures
pub fn endpoint_error_from_body(error: &Value) -> EndpointError {
    if let Some(message) = check_openai_context_length_error(error) {
        return EndpointError::ContextLengthExceeded(message);
    }
    if let Some(message) = check_bedrock_context_length_error(error) {
        return EndpointError::ContextLengthExceeded(message);
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string());
    EndpointError::Other(message)
}

pub fn check_openai_context_length_error(error: &Value) -> Option<String> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(message)
    } else {
        None
    }
}

pub fn check_bedrock_context_length_error(error: &Value) -> Option<String> {
    let external_message = error
        .get("external_model_message")?
        .get("message")?
        .as_str()?;
    if external_message.to_lowercase().contains("too long") {
        Some(external_message.to_string())
    } else {
        None
    }
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes arrive in arbitrary pieces, possibly splitting a UTF-8 character;
/// only complete lines are decoded, and the payloads of `data:` lines are
/// returned in order. Comments, `event:` and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, EndpointError> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(data) = data_field(decode_line(&line[..newline_pos])?) {
                payloads.push(data);
            }
        }
        Ok(payloads)
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Result<Option<String>, EndpointError> {
        let line = std::mem::take(&mut self.buffer);
        Ok(data_field(decode_line(&line)?))
    }
}

fn decode_line(line: &[u8]) -> Result<&str, EndpointError> {
    std::str::from_utf8(line)
        .map(|line| line.trim_end_matches('\r'))
        .map_err(|e| EndpointError::Decode(format!("event stream is not valid UTF-8: {}", e)))
}

fn data_field(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

/// Merge optional request parameters into a payload, skipping nulls
pub fn with_optional(mut payload: Map<String, Value>, optional: &[(&str, Value)]) -> Value {
    for (key, value) in optional {
        if !value.is_null() {
            payload.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_messages_to_openai_spec() {
        let spec = messages_to_openai_spec(&[Message::user("Hello")]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
    }

    #[test]
    fn test_messages_to_openai_spec_complex() {
        let messages = vec![
            Message::system("Be brief."),
            Message::user("What is 4*3 in Python?"),
            Message::assistant("Let me run that."),
            Message::tool_invocation("call_1", "system__ai__python_exec", r#"{"code":"print(4*3)"}"#),
            Message::tool_invocation("call_2", "system__ai__python_exec", r#"{"code":"print(5)"}"#),
            Message::tool_result("call_1", "12\n"),
            Message::tool_result("call_2", "5\n"),
            Message::assistant("12"),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 6);
        assert_eq!(spec[0]["role"], "system");
        assert_eq!(spec[2]["role"], "assistant");
        assert_eq!(spec[2]["content"], "Let me run that.");
        let tool_calls = spec[2]["tool_calls"].as_array().unwrap();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0]["id"], "call_1");
        assert_eq!(tool_calls[0]["function"]["arguments"], r#"{"code":"print(4*3)"}"#);
        assert_eq!(spec[3]["role"], "tool");
        assert_eq!(spec[3]["tool_call_id"], "call_1");
        assert_eq!(spec[3]["content"], "12\n");
        assert_eq!(spec[4]["tool_call_id"], "call_2");
        assert_eq!(spec[5]["content"], "12");
    }

    #[test]
    fn test_tool_invocation_without_text_opens_assistant_message() {
        let messages = vec![
            Message::user("hi"),
            Message::tool_invocation("call_1", "lookup", "{}"),
            Message::tool_result("call_1", "found"),
        ];
        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["role"], "assistant");
        assert!(spec[1].get("content").is_none());
        assert_eq!(spec[1]["tool_calls"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn test_empty_assistant_text_is_dropped() {
        let spec = messages_to_openai_spec(&[Message::user("hi"), Message::assistant("")]);
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = ToolSpec::new(
            "test_tool",
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Test parameter"
                    }
                },
                "required": ["input"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert!(spec[0]["function"].get("strict").is_none());
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = ToolSpec::new("test_tool", "Test tool", json!({"type": "object"}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("system__ai__python_exec"));
        assert!(!is_valid_function_name("system.ai.python_exec"));
        assert!(!is_valid_function_name("hello@world"));
    }

    #[test]
    fn test_sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").unwrap().is_empty());
        let payloads = decoder
            .push(b"1}\r\n\r\n: keep-alive\nevent: ping\ndata: [DONE]\n")
            .unwrap();
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), STREAM_DONE.to_string()]);
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_sse_decoder_keeps_characters_split_across_pieces() {
        let frame = "data: {\"t\":\"4\u{d7}3\"}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&frame[..split]).unwrap().is_empty());
        assert_eq!(
            decoder.push(&frame[split..]).unwrap(),
            vec!["{\"t\":\"4\u{d7}3\"}".to_string()]
        );
    }

    #[test]
    fn test_sse_decoder_rejects_invalid_utf8() {
        let mut decoder = SseDecoder::default();
        assert!(matches!(
            decoder.push(b"data: \xff\xfe\n"),
            Err(EndpointError::Decode(_))
        ));
    }

    #[test]
    fn test_sse_decoder_flushes_trailing_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data:{\"b\":2}").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some("{\"b\":2}".to_string()));
    }

    #[test]
    fn test_parse_chunk_surfaces_context_length() {
        let err = parse_chunk(
            r#"{"error": {"code": "context_length_exceeded", "message": "too many tokens"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EndpointError::ContextLengthExceeded(m) if m == "too many tokens"));
    }

    #[test]
    fn test_bedrock_context_length() {
        let body = json!({
            "error_code": "BAD_REQUEST",
            "message": "Input is too long",
            "external_model_message": {"message": "Input is too long for requested model."}
        });
        let error = error_payload(&body).unwrap();
        assert!(matches!(
            endpoint_error_from_body(&error),
            EndpointError::ContextLengthExceeded(_)
        ));
    }

    #[test]
    fn test_completion_to_chunk() -> Result<()> {
        let response = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "example_fn", "arguments": "{\"param\": \"value\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 25, "total_tokens": 35}
        });

        let chunk = completion_to_chunk(&response)?;
        let delta = &chunk.choices[0].delta;
        assert!(delta.content.is_none());
        let call = &delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(
            call.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"param\": \"value\"}")
        );
        assert_eq!(chunk.usage.unwrap().total_tokens, Some(35));
        Ok(())
    }
}
