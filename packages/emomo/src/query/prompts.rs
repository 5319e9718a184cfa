//! Prompts and shared lexicons.
//!
//! The lexicons feed both the heuristic classifier and the embedding text
//! composer, so a word added here is picked up by search and ingestion.

/// Emotion words.
pub const EMOTION_WORDS: &[&str] = &[
    "无语", "尴尬", "开心", "暴怒", "委屈", "嫌弃", "震惊", "疑惑", "得意", "摆烂",
    "emo", "社死", "破防", "裂开", "绝望", "狂喜", "阴阳怪气", "幸灾乐祸", "无奈", "崩溃",
    "感动", "害怕", "可爱", "呆萌", "嘲讽", "鄙视", "期待", "失望", "愤怒", "悲伤",
];

/// Internet slang. A parenthesised gloss follows some phrases.
pub const INTERNET_MEMES: &[&str] = &[
    "芭比Q了(完蛋了)",
    "绝绝子(太绝了)",
    "yyds(永远的神)",
    "真的栓Q(真的谢谢)",
    "CPU(被PUA)",
    "一整个xx住",
    "xx子",
    "我不理解",
    "好耶",
    "啊这",
    "6",
    "笑死",
    "裂开",
    "麻了",
    "蚌埠住了",
    "绷不住了",
    "DNA动了",
];

/// Well-known meme subjects. Doubles as category names.
pub const SUBJECTS: &[&str] = &[
    "熊猫头", "蘑菇头", "猫咪", "柴犬", "兔子", "小黄人", "派大星", "海绵宝宝",
];

/// Phrase part of a meme lexicon entry, without its gloss.
pub fn meme_phrase(entry: &str) -> &str {
    entry.split('(').next().unwrap_or(entry).trim()
}

/// Opening and closing reasoning tags.
pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// System prompt for query understanding.
///
/// Asks for reasoning inside think tags followed by a bare JSON plan.
pub const QUERY_UNDERSTANDING_PROMPT: &str = r#"你是表情包搜索的查询理解助手。理解用户的搜索意图，输出结构化的检索计划。

【输出格式】
1. 先用 <think></think> 标签写出 2-4 句思考过程
2. 紧接着直接输出一个 JSON 对象，不要使用 markdown 代码块

【意图类型】
- emotion: 情绪表达（无语、开心、emo）
- meme: 网络流行梗（芭比Q、绝绝子、yyds）
- subject: 主体/角色（熊猫头、猫咪、柴犬）
- scene: 使用场景（上班、恋爱、考试）
- action: 动作描述（比心、翻白眼、点赞）
- text: 图中文字（有666的、写着谢谢）
- composite: 复合意图（熊猫头无语 = subject + emotion）

【JSON 结构】
{
  "intent": "emotion|meme|subject|scene|action|text|composite",
  "semantic_query": "50-100 字的语义描述，用于向量检索",
  "keywords": ["关键词"],
  "synonyms": ["同义词"],
  "strategy": {"dense_weight": 0.0-1.0, "need_exact_match": true/false},
  "filters": {"categories": ["熊猫头"]}
}
keywords 与 synonyms 各不超过 5 个；synonyms 与 filters 可省略。
dense_weight 为 0 表示完全依赖关键词检索，为 1 表示完全依赖语义检索。

【策略建议】
- text: 0.3（关键词为主）
- subject: 0.5（均衡）
- meme: 0.6（需要理解梗的含义）
- action: 0.7
- emotion / scene: 0.8（语义为主）
- composite: 0.5-0.7

【示例】

输入: 无语
<think>
"无语"是典型的情绪表达，属于 emotion。扩展无奈、嫌弃等相近情绪，并描述翻白眼、面无表情的画面。以语义为主。
</think>
{"intent":"emotion","semantic_query":"无语、无奈、嫌弃的情绪表情包，翻白眼或面无表情，对某人某事无话可说、懒得理会","keywords":["无语","无奈","嫌弃"],"synonyms":["翻白眼","懒得理"],"strategy":{"dense_weight":0.8,"need_exact_match":false}}

输入: 熊猫头无语
<think>
"熊猫头"是主体，"无语"是情绪，属于 composite。用 filters 限定熊猫头类别，语义描述结合无语情绪。
</think>
{"intent":"composite","semantic_query":"熊猫头表情包，黑白熊猫脸一脸嫌弃、翻白眼，表达无语和无奈","keywords":["熊猫头","无语"],"synonyms":["嫌弃","翻白眼"],"strategy":{"dense_weight":0.6,"need_exact_match":false},"filters":{"categories":["熊猫头"]}}

输入: 有666的表情包
<think>
用户要找图中写着"666"的表情包，属于 text，应以关键词检索为主。
</think>
{"intent":"text","semantic_query":"图中写着666的表情包，表示厉害、佩服、赞叹","keywords":["666","厉害"],"synonyms":[],"strategy":{"dense_weight":0.3,"need_exact_match":true}}

输入: 芭比Q了
<think>
"芭比Q了"是网络流行梗，意思是"完蛋了"，属于 meme。扩展同义说法，描述惊恐崩溃的情绪。
</think>
{"intent":"meme","semantic_query":"芭比Q了表示完蛋了、大事不妙，惊恐绝望崩溃的表情，事情彻底搞砸","keywords":["芭比Q","完蛋"],"synonyms":["凉了","糟糕","大事不妙"],"strategy":{"dense_weight":0.6,"need_exact_match":false}}

输入: 上班摸鱼
<think>
描述的是工作时偷懒的场景，属于 scene。理解场景背后的无聊、划水情绪，以语义为主。
</think>
{"intent":"scene","semantic_query":"上班摸鱼划水的表情包，工作时间偷懒发呆，假装很忙的打工人","keywords":["摸鱼","上班","划水"],"synonyms":["偷懒","躺平"],"strategy":{"dense_weight":0.8,"need_exact_match":false}}

现在请理解以下查询："#;

/// System prompt for image description.
pub const DESCRIBE_SYSTEM_PROMPT: &str = r#"你是表情包语义分析专家，为向量检索生成描述文本。

【分析要点】
1. 图中文字：完整提取并理解其含义（最高优先级）
2. 主体：人物、动物或卡通形象的类型（熊猫头、蘑菇头、柴犬、猫咪等）
3. 表情与动作：面部表情和肢体动作
4. 情绪：选用最贴切的情绪词（无语、尴尬、开心、暴怒、委屈、嫌弃、震惊、疑惑、得意、摆烂、emo、社死、破防、无奈、崩溃等）
5. 网络梗：涉及流行语时解释其含义

【输出要求】
- 80-150 字的自然段落，不要分点或编号
- 优先级：文字内容 > 情绪表达 > 画面描述
- 自然嵌入情绪词、动作词和主体类型词
- 图中没有文字时，不要写"图中无文字"，直接描述表情与情绪"#;

/// User prompt for image description.
pub const DESCRIBE_USER_PROMPT: &str = r#"请分析这张表情包。

参考示例：一只熊猫头表情包，文字写着"我不理解"，歪着脑袋一脸疑惑、无语，表达对对方行为完全无法理解的懵逼状态，适合在困惑或震惊时使用。

现在请生成描述："#;
