//! Query Types
//!
//! 연결 핸들을 통해 전달되는 쿼리, 값, 결과 타입

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// AccessMode - 접근 모드
// ============================================================================

/// 접근 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// 읽기
    #[default]
    Read,
    /// 쓰기
    Write,
}

// ============================================================================
// Value - 그래프 값
// ============================================================================

/// 그래프 값 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// List
    List(Vec<Value>),
    /// Map
    Map(HashMap<String, Value>),
}

impl Value {
    /// Null 여부
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer로 변환
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// String으로 변환
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 변경 절 키워드
const UPDATE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH",
];

/// 쿼리
#[derive(Debug, Clone)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
    /// 명시적 접근 모드
    pub access_mode: Option<AccessMode>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
            access_mode: None,
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터 맵 병합
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }

    /// 접근 모드 지정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }

    /// 데이터를 변경하는 쿼리인지 확인
    ///
    /// 문자열 리터럴과 주석을 제외한 텍스트에서 변경 절을 찾습니다.
    /// 프로시저 호출(`CALL ns.proc()`)은 내용을 알 수 없으므로
    /// `AccessMode::Read`로 명시하지 않는 한 변경으로 간주합니다.
    pub fn is_mutating(&self) -> bool {
        if self.access_mode == Some(AccessMode::Write) {
            return true;
        }
        let tokens = keyword_tokens(&self.text);
        contains_update_clause(&tokens) || (self.access_mode.is_none() && calls_procedure(&tokens))
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// 쿼리 텍스트에서 키워드 토큰 추출
///
/// 속성 접근(`n.set`), 파라미터(`$set`), 레이블(`n:Set`), 맵 키(`{set: 1}`)는
/// 제외합니다.
/// 여는 중괄호는 `{` 토큰으로 남깁니다.
fn keyword_tokens(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let qualified = start > 0 && matches!(chars[start - 1], '.' | '$' | ':');
                let map_key = chars[i..].iter().find(|c| !c.is_whitespace()) == Some(&':');
                if !qualified && !map_key {
                    tokens.push(chars[start..i].iter().collect::<String>().to_ascii_uppercase());
                }
            }
            '{' => {
                tokens.push("{".to_string());
                i += 1;
            }
            _ => i += 1,
        }
    }

    tokens
}

fn contains_update_clause(tokens: &[String]) -> bool {
    tokens.iter().enumerate().any(|(i, token)| {
        UPDATE_CLAUSES.contains(&token.as_str())
            || (token == "LOAD" && tokens.get(i + 1).map(String::as_str) == Some("CSV"))
    })
}

/// `CALL { ... }` 서브쿼리가 아닌 프로시저 호출 포함 여부
fn calls_procedure(tokens: &[String]) -> bool {
    tokens.iter().enumerate().any(|(i, token)| {
        token == "CALL" && tokens.get(i + 1).is_some_and(|next| next != "{")
    })
}

// ============================================================================
// Record / QueryResult - 결과
// ============================================================================

/// 쿼리 결과 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 컬럼 키
    keys: Vec<String>,
    /// 값들
    values: Vec<Value>,
}

impl Record {
    /// 새 레코드 생성
    pub fn new(keys: Vec<String>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    /// 키 목록
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 값 목록
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 키로 값 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }
}

/// 쿼리 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// 컬럼 키
    pub keys: Vec<String>,
    /// 레코드
    pub records: Vec<Record>,
}

impl QueryResult {
    /// 새 결과 생성
    pub fn new(keys: Vec<String>, records: Vec<Record>) -> Self {
        Self { keys, records }
    }

    /// 빈 결과
    pub fn empty() -> Self {
        Self::default()
    }

    /// 첫 번째 레코드
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 빈 결과 여부
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
